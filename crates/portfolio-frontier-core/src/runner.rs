use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::constraints::{ConstraintValidator, StrategyDefinition};
use crate::error::FrontierError;
use crate::metrics::{evaluate_portfolio, PortfolioMetrics};
use crate::sampler::sample_weights;
use crate::universe::{AssetClasses, MarketStatistics};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Upper bound on the attempt budget of a single strategy.
pub const MAX_ATTEMPT_BUDGET: usize = 1_000_000_000;

/// Sampling parameters shared by every strategy of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Accepted portfolios to collect per strategy.
    #[serde(default = "default_target_samples")]
    pub target_samples: usize,
    /// Attempt budget as a multiple of `target_samples`.
    #[serde(default = "default_budget_multiplier")]
    pub budget_multiplier: usize,
    /// Explicit attempt budget; overrides `budget_multiplier`.
    #[serde(default)]
    pub attempt_budget: Option<usize>,
    /// Attempts per independently seeded block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Seed for reproducibility. Defaults to 42; an explicit `null` draws
    /// one from OS entropy.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
    /// Annual risk-free rate subtracted in the Sharpe ratio.
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Evaluate strategies and blocks on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_target_samples() -> usize {
    1_000
}

fn default_budget_multiplier() -> usize {
    100
}

fn default_block_size() -> usize {
    256
}

fn default_seed() -> Option<u64> {
    Some(42)
}

fn default_parallel() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_samples: default_target_samples(),
            budget_multiplier: default_budget_multiplier(),
            attempt_budget: None,
            block_size: default_block_size(),
            seed: default_seed(),
            risk_free_rate: 0.0,
            parallel: default_parallel(),
        }
    }
}

impl RunConfig {
    /// Maximum number of candidate draws per strategy.
    pub fn attempt_budget(&self) -> usize {
        self.attempt_budget
            .unwrap_or_else(|| self.target_samples.saturating_mul(self.budget_multiplier))
    }

    pub fn validate(&self) -> FrontierResult<()> {
        if self.target_samples == 0 {
            return Err(FrontierError::invalid("target_samples", "must be at least 1"));
        }
        if self.budget_multiplier == 0 {
            return Err(FrontierError::invalid("budget_multiplier", "must be at least 1"));
        }
        if self.block_size == 0 {
            return Err(FrontierError::invalid("block_size", "must be at least 1"));
        }
        if self.attempt_budget() > MAX_ATTEMPT_BUDGET {
            return Err(FrontierError::invalid(
                "attempt_budget",
                format!(
                    "budget {} exceeds the maximum of {MAX_ATTEMPT_BUDGET} attempts per strategy",
                    self.attempt_budget()
                ),
            ));
        }
        if self.attempt_budget() < self.target_samples {
            return Err(FrontierError::invalid(
                "attempt_budget",
                format!(
                    "budget {} is below target_samples {}",
                    self.attempt_budget(),
                    self.target_samples
                ),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(FrontierError::invalid("risk_free_rate", "must be finite"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The target number of portfolios was accepted.
    Complete,
    /// The attempt budget ran out first; the result set is partial.
    BudgetExhausted,
}

/// One accepted portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSample {
    pub weights: Vec<f64>,
    pub metrics: PortfolioMetrics,
}

/// Accepted portfolios of one strategy, in acceptance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResultSet {
    pub strategy: String,
    pub samples: Vec<PortfolioSample>,
    pub target: usize,
    pub attempts: usize,
    pub attempt_budget: usize,
    pub degenerate_draws: u64,
    pub status: RunStatus,
}

impl StrategyResultSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.attempts - self.samples.len()
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.attempts as f64
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = &PortfolioMetrics> {
        self.samples.iter().map(|s| &s.metrics)
    }

    /// Fail with `SamplingBudgetExhausted` unless the target was reached.
    pub fn require_complete(&self) -> FrontierResult<&Self> {
        match self.status {
            RunStatus::Complete => Ok(self),
            RunStatus::BudgetExhausted => Err(FrontierError::SamplingBudgetExhausted {
                strategy: self.strategy.clone(),
                accepted: self.samples.len(),
                target: self.target,
                attempts: self.attempts,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the RNG stream for one block of one strategy.
pub fn block_seed(seed: u64, strategy_index: usize, block_index: usize) -> u64 {
    let s = splitmix64(seed ^ splitmix64(strategy_index as u64));
    splitmix64(s ^ splitmix64(block_index as u64).rotate_left(17))
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Accepted samples of one block, tagged with their attempt offset in the
/// block, plus any degenerate draws met on the way.
///
/// A failed evaluation ends the block and is kept with its offset; it only
/// fails the run if the merge reaches that offset.
struct BlockOutcome {
    attempts: usize,
    accepted: Vec<(usize, PortfolioSample)>,
    degenerate: Vec<(usize, u32)>,
    failure: Option<(usize, FrontierError)>,
}

/// Rejection-samples one strategy until its target or budget is reached.
///
/// Attempts are split into blocks of `block_size`, each drawing from its
/// own stream seeded by `(seed, strategy_index, block_index)`. Blocks are
/// merged in block order and the merge stops at the attempt that reaches
/// the target, so the result does not depend on how blocks are scheduled.
pub struct StrategyRunner<'a> {
    stats: &'a MarketStatistics,
    classes: &'a AssetClasses,
    config: &'a RunConfig,
    seed: u64,
}

impl<'a> StrategyRunner<'a> {
    pub fn new(
        stats: &'a MarketStatistics,
        classes: &'a AssetClasses,
        config: &'a RunConfig,
        seed: u64,
    ) -> Self {
        Self {
            stats,
            classes,
            config,
            seed,
        }
    }

    pub fn run(
        &self,
        strategy: &StrategyDefinition,
        strategy_index: usize,
    ) -> FrontierResult<StrategyResultSet> {
        self.config.validate()?;
        if self.classes.len() != self.stats.n_assets() {
            return Err(FrontierError::shape(format!(
                "{} class labels for {} assets",
                self.classes.len(),
                self.stats.n_assets()
            )));
        }

        let target = self.config.target_samples;
        let budget = self.config.attempt_budget();
        let block_size = self.config.block_size;
        let n_blocks = budget.div_ceil(block_size);
        let validator = ConstraintValidator::new(&strategy.policy, self.classes);

        debug!(
            strategy = %strategy.name,
            target,
            budget,
            "sampling strategy"
        );

        let mut samples: Vec<PortfolioSample> =
            Vec::with_capacity(target.min(block_size.saturating_mul(self.wave_width())));
        let mut attempts = 0usize;
        let mut degenerate_draws = 0u64;
        let mut next_block = 0usize;

        'waves: while next_block < n_blocks {
            let end = (next_block + self.wave_width()).min(n_blocks);
            let remaining = target - samples.len();
            let outcomes = self.evaluate_blocks(
                next_block..end,
                strategy_index,
                &validator,
                remaining,
            );

            for outcome in outcomes {
                let remaining = target - samples.len();
                if outcome.accepted.len() >= remaining {
                    let cut = outcome.accepted[remaining - 1].0;
                    attempts += cut + 1;
                    degenerate_draws += outcome
                        .degenerate
                        .iter()
                        .filter(|(offset, _)| *offset <= cut)
                        .map(|(_, n)| u64::from(*n))
                        .sum::<u64>();
                    samples.extend(outcome.accepted.into_iter().take(remaining).map(|(_, s)| s));
                    break 'waves;
                }
                if let Some((_, err)) = outcome.failure {
                    return Err(err);
                }
                attempts += outcome.attempts;
                degenerate_draws += outcome
                    .degenerate
                    .iter()
                    .map(|(_, n)| u64::from(*n))
                    .sum::<u64>();
                samples.extend(outcome.accepted.into_iter().map(|(_, s)| s));
            }
            next_block = end;
        }

        let status = if samples.len() == target {
            RunStatus::Complete
        } else {
            RunStatus::BudgetExhausted
        };

        if status == RunStatus::BudgetExhausted {
            warn!(
                strategy = %strategy.name,
                accepted = samples.len(),
                target,
                attempts,
                "sampling budget exhausted"
            );
        } else {
            debug!(
                strategy = %strategy.name,
                attempts,
                "strategy complete"
            );
        }

        Ok(StrategyResultSet {
            strategy: strategy.name.clone(),
            samples,
            target,
            attempts,
            attempt_budget: budget,
            degenerate_draws,
            status,
        })
    }

    fn block_range(&self, block_index: usize) -> Range<usize> {
        let budget = self.config.attempt_budget();
        let start = block_index * self.config.block_size;
        start..(start + self.config.block_size).min(budget)
    }

    /// Run one block, stopping once `stop_after` candidates were accepted.
    fn evaluate_block(
        &self,
        block_index: usize,
        strategy_index: usize,
        validator: &ConstraintValidator<'_>,
        stop_after: usize,
    ) -> BlockOutcome {
        let mut rng = StdRng::seed_from_u64(block_seed(self.seed, strategy_index, block_index));
        let n = self.stats.n_assets();
        let len = self.block_range(block_index).len();

        let mut outcome = BlockOutcome {
            attempts: 0,
            accepted: Vec::new(),
            degenerate: Vec::new(),
            failure: None,
        };

        for offset in 0..len {
            outcome.attempts += 1;
            let draw = match sample_weights(&mut rng, n) {
                Ok(draw) => draw,
                Err(e) => {
                    outcome.failure = Some((offset, e));
                    break;
                }
            };
            if draw.degenerate_draws > 0 {
                outcome.degenerate.push((offset, draw.degenerate_draws));
            }
            if !validator.accepts(&draw.weights) {
                continue;
            }
            let metrics =
                match evaluate_portfolio(&draw.weights, self.stats, self.config.risk_free_rate) {
                    Ok(m) => m,
                    Err(e) => {
                        outcome.failure = Some((offset, e));
                        break;
                    }
                };
            outcome.accepted.push((
                offset,
                PortfolioSample {
                    weights: draw.weights,
                    metrics,
                },
            ));
            if outcome.accepted.len() >= stop_after {
                break;
            }
        }
        outcome
    }

    #[cfg(feature = "parallel")]
    fn wave_width(&self) -> usize {
        if self.config.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn wave_width(&self) -> usize {
        1
    }

    #[cfg(feature = "parallel")]
    fn evaluate_blocks(
        &self,
        blocks: Range<usize>,
        strategy_index: usize,
        validator: &ConstraintValidator<'_>,
        stop_after: usize,
    ) -> Vec<BlockOutcome> {
        if self.config.parallel {
            blocks
                .into_par_iter()
                .map(|k| self.evaluate_block(k, strategy_index, validator, stop_after))
                .collect()
        } else {
            blocks
                .map(|k| self.evaluate_block(k, strategy_index, validator, stop_after))
                .collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_blocks(
        &self,
        blocks: Range<usize>,
        strategy_index: usize,
        validator: &ConstraintValidator<'_>,
        stop_after: usize,
    ) -> Vec<BlockOutcome> {
        blocks
            .map(|k| self.evaluate_block(k, strategy_index, validator, stop_after))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
