//! Job table: tracks background and suspended children.

use std::collections::{BTreeMap, HashSet};

use crate::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: u32,
    pub pgid: i32,
    /// Representative pid — the last pipeline stage, whose exit status is
    /// the job's exit status (matching a pipeline's own exit-status rule).
    pub pid: i32,
    /// Every process sharing this job's `pgid`. A single external command
    /// has exactly one; a backgrounded pipeline has one per stage.
    pub pids: Vec<i32>,
    pub cmd: String,
    pub running: bool,
    pub stopped: bool,
    pub status: i32,
    exited: HashSet<i32>,
}

impl Job {
    /// `[id] Running|Stopped|Done\t<cmd>` per spec §6.
    pub fn status_word(&self) -> &'static str {
        if self.stopped {
            "Stopped"
        } else if self.running {
            "Running"
        } else {
            "Done"
        }
    }

    pub fn format_line(&self) -> String {
        format!("[{}] {}\t{}", self.job_id, self.status_word(), self.cmd)
    }

    /// Records that `pid` (one of this job's member processes) has exited.
    /// Returns `true` once every member has exited — per spec.md §3
    /// invariant 5, `running` must stay `true` until then, not just until
    /// the first member exits.
    pub fn mark_exited(&mut self, pid: i32) -> bool {
        self.exited.insert(pid);
        self.exited.len() >= self.pids.len()
    }

    pub fn is_last_stage(&self, pid: i32) -> bool {
        self.pids.last() == Some(&pid)
    }
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<u32, Job>,
    next_id: u32,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: BTreeMap::new(), next_id: 1 }
    }

    /// Registers a job for `pids` (every process sharing `pgid`). `pid` is
    /// recorded as the last element of `pids` — the stage whose exit status
    /// becomes the job's own, per pipeline exit-status convention.
    pub fn add(&mut self, pgid: i32, pids: Vec<i32>, cmd: String) -> u32 {
        let job_id = self.next_id;
        self.next_id += 1;
        let pid = *pids.last().unwrap_or(&pgid);
        debug::trace(debug::JOB, "job", format!("[{job_id}] pgid {pgid} pids {pids:?} `{cmd}`"));
        self.jobs.insert(
            job_id,
            Job { job_id, pgid, pid, pids, cmd, running: true, stopped: false, status: 0, exited: HashSet::new() },
        );
        job_id
    }

    pub fn get(&self, job_id: u32) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: u32) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    /// Finds the job owning process group `pgid`, for updates sourced from
    /// `waitpid`/`SIGCHLD` where only a raw pid/pgid is known.
    pub fn find_by_pgid_mut(&mut self, pgid: i32) -> Option<&mut Job> {
        self.jobs.values_mut().find(|j| j.pgid == pgid)
    }

    /// Finds the job with a member process `pid` — any pipeline stage, not
    /// just the representative `pid`, so a SIGCHLD for an earlier stage
    /// still resolves to the right job.
    pub fn find_by_member_pid_mut(&mut self, pid: i32) -> Option<&mut Job> {
        self.jobs.values_mut().find(|j| j.pids.contains(&pid))
    }

    pub fn remove(&mut self, job_id: u32) -> Option<Job> {
        self.jobs.remove(&job_id)
    }

    /// Jobs no longer running and not stopped — reaped at the next prompt.
    pub fn drain_done(&mut self) -> Vec<Job> {
        let done_ids: Vec<u32> = self
            .jobs
            .values()
            .filter(|j| !j.running && !j.stopped)
            .map(|j| j.job_id)
            .collect();
        done_ids.into_iter().filter_map(|id| self.jobs.remove(&id)).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_monotonic_ids() {
        let mut t = JobTable::new();
        let a = t.add(100, vec![100], "sleep 1".into());
        let b = t.add(200, vec![200], "sleep 2".into());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn running_true_until_marked_done() {
        let mut t = JobTable::new();
        let id = t.add(100, vec![100], "sleep 1".into());
        assert!(t.get(id).unwrap().running);
        t.get_mut(id).unwrap().running = false;
        assert_eq!(t.get(id).unwrap().status_word(), "Done");
    }

    #[test]
    fn drain_done_removes_finished_jobs_only() {
        let mut t = JobTable::new();
        let running_id = t.add(1, vec![1], "a".into());
        let done_id = t.add(2, vec![2], "b".into());
        t.get_mut(done_id).unwrap().running = false;
        let drained = t.drain_done();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].job_id, done_id);
        assert!(t.get(running_id).is_some());
        assert!(t.get(done_id).is_none());
    }

    #[test]
    fn format_line_matches_job_listing_contract() {
        let mut t = JobTable::new();
        let id = t.add(5, vec![5], "sleep 10".into());
        assert_eq!(t.get(id).unwrap().format_line(), "[1] Running\tsleep 10");
    }

    #[test]
    fn job_stays_running_until_every_member_pid_exits() {
        let mut t = JobTable::new();
        let id = t.add(100, vec![100, 101], "cat file | sleep 100".into());
        let job = t.get_mut(id).unwrap();
        assert!(!job.mark_exited(100));
        assert!(job.running);
        let job = t.get_mut(id).unwrap();
        assert!(job.mark_exited(101));
    }

    #[test]
    fn find_by_member_pid_mut_resolves_any_pipeline_stage() {
        let mut t = JobTable::new();
        t.add(100, vec![100, 101, 102], "a | b | c".into());
        assert!(t.find_by_member_pid_mut(101).is_some());
        assert!(t.find_by_member_pid_mut(999).is_none());
    }
}
