//! Command-line surface: argument parsing and help/version text, per
//! spec §6's CLI surface.

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub enum Mode {
    Repl,
    Command(String),
    Script(String),
    Help,
    Version,
}

/// Parses `argv[1..]` per the positional shape documented in
/// SPEC_FULL.md §6: no args → REPL, `-c CMD [...]`, a script path, or a
/// help/version flag.
pub fn parse_args(args: &[String]) -> Mode {
    match args {
        [] => Mode::Repl,
        [flag] if flag == "--help" || flag == "-h" => Mode::Help,
        [flag] if flag == "--version" || flag == "-V" => Mode::Version,
        [flag, rest @ ..] if flag == "-c" => Mode::Command(rest.join(" ")),
        [path] => Mode::Script(path.clone()),
        _ => Mode::Help,
    }
}

pub fn print_help() {
    println!(
        r#"qsh {VERSION} — an interactive POSIX-ish shell

USAGE:
    qsh                   start the interactive REPL
    qsh -c <command>      execute a single command line
    qsh <script>          execute a script file line by line
    qsh --help, -h        show this message
    qsh --version, -V     show version

Run 'help' inside the shell for the list of builtin commands.
"#
    );
}

pub fn print_version() {
    println!("qsh {VERSION}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_is_repl() {
        assert!(matches!(parse_args(&args(&[])), Mode::Repl));
    }

    #[test]
    fn dash_c_joins_remaining_args() {
        match parse_args(&args(&["-c", "echo", "hi"])) {
            Mode::Command(cmd) => assert_eq!(cmd, "echo hi"),
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn bare_path_is_script() {
        match parse_args(&args(&["script.sh"])) {
            Mode::Script(path) => assert_eq!(path, "script.sh"),
            _ => panic!("expected Script"),
        }
    }

    #[test]
    fn help_flags_recognized() {
        assert!(matches!(parse_args(&args(&["--help"])), Mode::Help));
        assert!(matches!(parse_args(&args(&["-h"])), Mode::Help));
    }
}
