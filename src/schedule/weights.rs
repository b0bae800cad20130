//! Weighted job set
//!
//! Turns the historical cost table and the discovered module universe into a
//! complete, deterministically ordered job list.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::{ShardError, ShardResult};
use crate::models::Job;

/// Historical runtime per module, in minutes
pub type CostTable = BTreeMap<String, u64>;

/// Cost used when there is no history at all
const FALLBACK_COST: u64 = 1;

/// Complete job list sorted by descending cost, then module name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedJobSet {
    jobs: Vec<Job>,
    default_cost: u64,
}

impl WeightedJobSet {
    /// Build jobs for every module in `universe`.
    ///
    /// Modules without history get the rounded mean of the known costs.
    pub fn build<I, S>(history: &CostTable, universe: I) -> ShardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let universe: BTreeSet<String> = universe
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect();

        if universe.is_empty() {
            return Err(ShardError::DiscoveryFailure(
                "module universe is empty, nothing to schedule".to_string(),
            ));
        }

        let default_cost = average_cost(history);
        let mut estimated = 0usize;

        let mut jobs: Vec<Job> = universe
            .into_iter()
            .map(|module| match history.get(&module) {
                Some(&cost) => Job::new(module, cost),
                None => {
                    debug!("No history for {}, using {}m", module, default_cost);
                    estimated += 1;
                    Job::new(module, default_cost)
                }
            })
            .collect();

        let stale = history.len() + estimated - jobs.len();
        if stale > 0 {
            debug!("{} module(s) in the cost table were not discovered", stale);
        }

        jobs.sort_by(|a, b| {
            b.estimated_cost
                .cmp(&a.estimated_cost)
                .then_with(|| a.module_id.cmp(&b.module_id))
        });

        info!(
            "Weighted {} jobs ({} estimated at {}m)",
            jobs.len(),
            estimated,
            default_cost
        );

        Ok(Self { jobs, default_cost })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Cost assigned to modules missing from history
    pub fn default_cost(&self) -> u64 {
        self.default_cost
    }

    pub fn total_cost(&self) -> u64 {
        self.jobs.iter().map(|j| j.estimated_cost).sum()
    }
}

/// Rounded mean of the known costs, half rounding up
pub fn average_cost(history: &CostTable) -> u64 {
    if history.is_empty() {
        return FALLBACK_COST;
    }
    let sum: u64 = history.values().sum();
    let count = history.len() as u64;
    (2 * sum + count) / (2 * count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, u64)]) -> CostTable {
        entries
            .iter()
            .map(|(m, c)| (m.to_string(), *c))
            .collect()
    }

    #[test]
    fn test_unknown_module_gets_rounded_mean() {
        let history = table(&[("acr", 34), ("vm", 186), ("util", 6)]);
        // 226 / 3 = 75.33
        let set = WeightedJobSet::build(&history, ["acr", "vm", "util", "newmod"]).unwrap();
        let job = set.jobs().iter().find(|j| j.module_id == "newmod").unwrap();
        assert_eq!(job.estimated_cost, 75);
        assert_eq!(set.default_cost(), 75);
    }

    #[test]
    fn test_mean_rounds_half_up() {
        assert_eq!(average_cost(&table(&[("a", 1), ("b", 2)])), 2);
        assert_eq!(average_cost(&table(&[("a", 10), ("b", 13), ("c", 13)])), 12);
        assert_eq!(average_cost(&CostTable::new()), FALLBACK_COST);
    }

    #[test]
    fn test_sorted_by_cost_then_name() {
        let history = table(&[("b", 30), ("a", 10), ("c", 20), ("z", 10)]);
        let set = WeightedJobSet::build(&history, ["a", "b", "c", "z"]).unwrap();
        let order: Vec<_> = set.jobs().iter().map(|j| j.module_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "z"]);
    }

    #[test]
    fn test_covers_exactly_the_universe() {
        let history = table(&[("gone", 500), ("vm", 186)]);
        let set = WeightedJobSet::build(&history, ["vm", "vm", "new"]).unwrap();
        let modules: Vec<_> = set.jobs().iter().map(|j| j.module_id.as_str()).collect();
        assert_eq!(modules, vec!["new", "vm"]);
        assert_eq!(set.total_cost(), 186 + 343);
    }

    #[test]
    fn test_empty_universe_is_discovery_failure() {
        let history = table(&[("vm", 186)]);
        let err = WeightedJobSet::build(&history, Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ShardError::DiscoveryFailure(_)));
    }
}
