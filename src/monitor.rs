//! Search budget enforcement and instrumentation.
//!
//! Each site search owns one `SearchMonitor`. Every backtracking node calls
//! [`SearchMonitor::on_step`], which counts the node and aborts the search
//! once the configured node or wall-clock budget is spent. The clock is only
//! sampled when `(nodes & clock_check_mask) == 0`.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Limits applied to a single site search. `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_nodes: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl SearchBudget {
    /// A budget without any limits.
    pub const fn unlimited() -> Self {
        Self {
            max_nodes: None,
            time_limit: None,
        }
    }
}

/// Reason a site search was aborted.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SearchAborted {
    #[error("search exceeded node budget of {0} nodes")]
    NodeBudget(u64),
    #[error("search exceeded time budget of {0}ms")]
    TimeBudget(u128),
}

/// Counters collected while searching one site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SearchStats {
    /// Number of row-packing feasibility checks (one per orientation tried).
    pub oracle_calls: u64,
    /// Backtracking nodes visited across assignment search and row packing.
    pub nodes: u64,
    /// Combinations handed to the assignment search.
    pub combinations_evaluated: u64,
    /// Combinations skipped because they cost at least the best offer.
    pub combinations_pruned: u64,
}

#[derive(Debug, Clone)]
pub struct SearchMonitor {
    budget: SearchBudget,
    stats: SearchStats,
    clock_check_mask: u64,
    start_time: Instant,
}

impl SearchMonitor {
    /// Check the clock every 1024 nodes.
    const DEFAULT_CLOCK_CHECK_MASK: u64 = 0x3FF;

    pub fn new(budget: SearchBudget) -> Self {
        Self::with_clock_check_mask(budget, Self::DEFAULT_CLOCK_CHECK_MASK)
    }

    pub fn with_clock_check_mask(budget: SearchBudget, clock_check_mask: u64) -> Self {
        Self {
            budget,
            stats: SearchStats::default(),
            clock_check_mask,
            start_time: Instant::now(),
        }
    }

    /// Counts one search node and enforces the budget.
    #[inline]
    pub fn on_step(&mut self) -> Result<(), SearchAborted> {
        self.stats.nodes = self.stats.nodes.wrapping_add(1);

        if let Some(max_nodes) = self.budget.max_nodes {
            if self.stats.nodes > max_nodes {
                return Err(SearchAborted::NodeBudget(max_nodes));
            }
        }

        if let Some(limit) = self.budget.time_limit {
            if (self.stats.nodes & self.clock_check_mask) == 0 && self.start_time.elapsed() >= limit
            {
                return Err(SearchAborted::TimeBudget(limit.as_millis()));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn record_oracle_call(&mut self) {
        self.stats.oracle_calls += 1;
    }

    #[inline]
    pub fn record_combination_evaluated(&mut self) {
        self.stats.combinations_evaluated += 1;
    }

    #[inline]
    pub fn record_combination_pruned(&mut self) {
        self.stats.combinations_pruned += 1;
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }
}
