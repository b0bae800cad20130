//! Job and partition models
//!
//! A job is one test module with its estimated runtime. A partition assigns
//! every job to exactly one worker instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A schedulable test module with its estimated cost in minutes
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Job {
    pub module_id: String,
    pub estimated_cost: u64,
}

impl Job {
    pub fn new(module_id: impl Into<String>, estimated_cost: u64) -> Self {
        Self {
            module_id: module_id.into(),
            estimated_cost,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}m)", self.module_id, self.estimated_cost)
    }
}

/// Jobs assigned to one worker instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    /// Zero-based worker index
    pub worker_index: usize,
    jobs: Vec<Job>,
    total_cost: u64,
}

impl WorkerAssignment {
    pub fn new(worker_index: usize) -> Self {
        Self {
            worker_index,
            jobs: Vec::new(),
            total_cost: 0,
        }
    }

    /// Append a job and refresh the running total
    pub(crate) fn push(&mut self, job: Job) {
        self.jobs.push(job);
        self.total_cost = self.jobs.iter().map(|j| j.estimated_cost).sum();
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.module_id.clone()).collect()
    }
}

/// One assignment per worker, indexed by worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    assignments: Vec<WorkerAssignment>,
}

impl Partition {
    pub(crate) fn from_assignments(assignments: Vec<WorkerAssignment>) -> Self {
        Self { assignments }
    }

    pub fn assignments(&self) -> &[WorkerAssignment] {
        &self.assignments
    }

    pub fn worker_count(&self) -> usize {
        self.assignments.len()
    }

    /// Assignment for a zero-based worker index
    pub fn worker(&self, index: usize) -> Option<&WorkerAssignment> {
        self.assignments.get(index)
    }

    /// Largest worker load
    pub fn makespan(&self) -> u64 {
        self.assignments
            .iter()
            .map(|a| a.total_cost())
            .max()
            .unwrap_or(0)
    }

    /// Difference between the heaviest and lightest worker
    pub fn imbalance(&self) -> u64 {
        let min = self
            .assignments
            .iter()
            .map(|a| a.total_cost())
            .min()
            .unwrap_or(0);
        self.makespan() - min
    }

    pub fn job_count(&self) -> usize {
        self.assignments.iter().map(|a| a.jobs().len()).sum()
    }
}
