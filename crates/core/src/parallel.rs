// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel speedup models for compute actions.
//!
//! A model splits a total amount of work (in flops) across a number of
//! threads; the executor then charges each thread its share. The
//! longest share determines the action's duration.

use crate::FailureCause;
use std::sync::Arc;

/// How a compute action's flops are divided across threads.
#[derive(Clone)]
pub enum ParallelModel {
    /// Amdahl's law: a fraction `alpha` of the work is perfectly
    /// parallelizable, the rest is sequential (charged to one thread).
    Amdahl { alpha: f64 },
    /// Each thread runs at a constant parallel efficiency.
    ConstantEfficiency { efficiency: f64 },
    /// User-supplied split: `f(flops, num_threads) -> work per thread`.
    Custom(Arc<dyn Fn(f64, u32) -> Vec<f64> + Send + Sync>),
}

impl ParallelModel {
    /// Amdahl model with parallelizable fraction `alpha` ∈ [0, 1].
    pub fn amdahl(alpha: f64) -> Result<Self, FailureCause> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(FailureCause::invalid_argument(format!(
                "amdahl alpha must be in [0, 1], got {alpha}"
            )));
        }
        Ok(ParallelModel::Amdahl { alpha })
    }

    /// Constant-efficiency model with `efficiency` ∈ (0, 1].
    pub fn constant_efficiency(efficiency: f64) -> Result<Self, FailureCause> {
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            return Err(FailureCause::invalid_argument(format!(
                "parallel efficiency must be in (0, 1], got {efficiency}"
            )));
        }
        Ok(ParallelModel::ConstantEfficiency { efficiency })
    }

    pub fn custom(f: impl Fn(f64, u32) -> Vec<f64> + Send + Sync + 'static) -> Self {
        ParallelModel::Custom(Arc::new(f))
    }

    /// The work (in flops) each of `num_threads` threads performs.
    pub fn work_per_thread(&self, flops: f64, num_threads: u32) -> Vec<f64> {
        let n = num_threads.max(1);
        match self {
            ParallelModel::Amdahl { alpha } => {
                let parallel_share = alpha * flops / n as f64;
                let mut work = vec![parallel_share; n as usize];
                // The sequential remainder lands on the first thread.
                work[0] += (1.0 - alpha) * flops;
                work
            }
            ParallelModel::ConstantEfficiency { efficiency } => {
                vec![flops / (n as f64 * efficiency); n as usize]
            }
            ParallelModel::Custom(f) => f(flops, n),
        }
    }
}

impl Default for ParallelModel {
    /// Perfectly parallelizable work.
    fn default() -> Self {
        ParallelModel::Amdahl { alpha: 1.0 }
    }
}

impl std::fmt::Debug for ParallelModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParallelModel::Amdahl { alpha } => write!(f, "Amdahl({alpha})"),
            ParallelModel::ConstantEfficiency { efficiency } => {
                write!(f, "ConstantEfficiency({efficiency})")
            }
            ParallelModel::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
#[path = "parallel_tests.rs"]
mod tests;
