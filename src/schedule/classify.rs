//! Serial / parallel batch classification

use std::collections::BTreeSet;

use crate::models::{Job, WorkerAssignment};

/// Jobs of one worker split by execution mode, relative order preserved
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub serial: Vec<Job>,
    pub parallel: Vec<Job>,
}

impl BatchPlan {
    pub fn serial_modules(&self) -> Vec<String> {
        self.serial.iter().map(|j| j.module_id.clone()).collect()
    }

    pub fn parallel_modules(&self) -> Vec<String> {
        self.parallel.iter().map(|j| j.module_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.serial.is_empty() && self.parallel.is_empty()
    }
}

/// Splits assignments using the set of modules that mutate shared state
#[derive(Clone, Debug, Default)]
pub struct BatchClassifier {
    serial_modules: BTreeSet<String>,
}

impl BatchClassifier {
    pub fn new<I, S>(serial_modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            serial_modules: serial_modules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_serial(&self, module_id: &str) -> bool {
        self.serial_modules.contains(module_id)
    }

    pub fn classify(&self, assignment: &WorkerAssignment) -> BatchPlan {
        let (serial, parallel) = assignment
            .jobs()
            .iter()
            .cloned()
            .partition(|job| self.is_serial(&job.module_id));
        BatchPlan { serial, parallel }
    }
}
