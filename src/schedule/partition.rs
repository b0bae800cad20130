//! Greedy longest-processing-time partitioning
//!
//! Jobs arrive sorted by descending cost; each goes to the currently least
//! loaded worker, ties going to the lowest worker index. With sorted input the
//! makespan stays within `4/3 - 1/(3N)` of optimal.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info, warn};

use crate::error::{ShardError, ShardResult};
use crate::models::{Job, Partition, WorkerAssignment};

/// Assigns weighted jobs to a fixed number of workers
#[derive(Clone, Copy, Debug)]
pub struct GreedyPartitioner {
    workers: usize,
}

impl GreedyPartitioner {
    pub fn new(workers: usize) -> ShardResult<Self> {
        if workers == 0 {
            return Err(ShardError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(Self { workers })
    }

    /// Partition `jobs` across the workers.
    ///
    /// Pure: the same job list and worker count always yield the same result.
    pub fn partition(&self, jobs: &[Job]) -> Partition {
        if !jobs
            .windows(2)
            .all(|w| w[0].estimated_cost >= w[1].estimated_cost)
        {
            warn!("Jobs are not sorted by descending cost; balance bound does not hold");
        }

        let mut assignments: Vec<WorkerAssignment> =
            (0..self.workers).map(WorkerAssignment::new).collect();

        // (load, index) min-heap; equal loads pop the lowest index first
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> =
            (0..self.workers).map(|i| Reverse((0, i))).collect();

        for job in jobs {
            let Some(Reverse((_, index))) = heap.pop() else {
                break;
            };
            let worker = &mut assignments[index];
            worker.push(job.clone());
            debug!("{} -> worker {} (load {}m)", job, index, worker.total_cost());
            heap.push(Reverse((worker.total_cost(), index)));
        }

        let partition = Partition::from_assignments(assignments);
        info!(
            "Partitioned {} jobs over {} workers (makespan {}m, imbalance {}m)",
            partition.job_count(),
            self.workers,
            partition.makespan(),
            partition.imbalance()
        );
        partition
    }
}
