//! Whole-run orchestration: validate inputs, sample every strategy, and
//! pick each strategy's max-Sharpe portfolio.
//!
//! Every structural check happens before the first sample is drawn, so a
//! malformed input never yields a partial run. Strategies share only
//! read-only inputs and each returns its own result set by value.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::constraints::{presets, AllocationPolicy, StrategyDefinition};
use crate::error::FrontierError;
use crate::runner::{RunConfig, RunStatus, StrategyResultSet, StrategyRunner};
use crate::selector::{select_optimal, weight_comparison, OptimalPortfolio, WeightComparisonRow};
use crate::types::{with_metadata, ComputationOutput};
use crate::universe::{AssetClasses, AssetUniverse, ClassLookup, MarketStatistics};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything a frontier run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub assets: AssetUniverse,
    pub class_lookup: ClassLookup,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Vec<Vec<f64>>,
    /// Strategies in run order. Empty means the built-in presets.
    #[serde(default)]
    pub strategies: Vec<StrategyDefinition>,
    #[serde(flatten)]
    pub config: RunConfig,
}

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub name: String,
    pub policy: AllocationPolicy,
    pub status: RunStatus,
    pub accepted: usize,
    pub attempts: usize,
    pub acceptance_rate: f64,
    /// `None` when no portfolio was accepted within the budget.
    pub optimal: Option<OptimalPortfolio>,
    pub samples: StrategyResultSet,
}

/// Output of a frontier run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierOutput {
    /// Seed actually used, so unseeded runs can be replayed.
    pub seed: u64,
    pub assets: Vec<String>,
    pub strategies: Vec<StrategyReport>,
    pub weight_comparison: Vec<WeightComparisonRow>,
}

impl FrontierOutput {
    pub fn strategy(&self, name: &str) -> Option<&StrategyReport> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn optimal(&self, name: &str) -> Option<&OptimalPortfolio> {
        self.strategy(name).and_then(|s| s.optimal.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Sample feasible portfolios for every strategy and select each optimum.
pub fn run_frontier(input: &FrontierInput) -> FrontierResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let stats = MarketStatistics::new(
        input.assets.clone(),
        input.expected_returns.clone(),
        input.covariance_matrix.clone(),
    )?;
    let classes = AssetClasses::resolve(&input.assets, &input.class_lookup, &mut warnings)?;
    input.config.validate()?;

    let strategies = if input.strategies.is_empty() {
        presets::standard_strategies()
    } else {
        input.strategies.clone()
    };
    validate_strategies(&strategies, &classes, &mut warnings)?;

    let seed = input
        .config
        .seed
        .unwrap_or_else(|| StdRng::from_entropy().gen());

    info!(
        assets = stats.n_assets(),
        strategies = strategies.len(),
        target = input.config.target_samples,
        seed,
        "starting frontier run"
    );

    let runner = StrategyRunner::new(&stats, &classes, &input.config, seed);
    let results = run_strategies(&runner, &strategies, input.config.parallel)?;

    let mut reports = Vec::with_capacity(strategies.len());
    for (def, result) in strategies.into_iter().zip(results) {
        if result.status == RunStatus::BudgetExhausted {
            warnings.push(format!(
                "strategy '{}': sampling budget exhausted, {} of {} portfolios accepted after {} attempts",
                def.name,
                result.len(),
                result.target,
                result.attempts
            ));
        }
        let optimal = match select_optimal(&result, &input.assets, &classes) {
            Ok(best) => Some(best),
            Err(FrontierError::EmptyResultSet { strategy }) => {
                let msg = format!("strategy '{strategy}': no feasible portfolio found");
                warn!("{msg}");
                warnings.push(msg);
                None
            }
            Err(e) => return Err(e),
        };
        reports.push(StrategyReport {
            name: def.name,
            policy: def.policy,
            status: result.status,
            accepted: result.len(),
            attempts: result.attempts,
            acceptance_rate: result.acceptance_rate(),
            optimal,
            samples: result,
        });
    }

    let weight_comparison = weight_comparison(
        reports
            .iter()
            .filter_map(|r| r.optimal.as_ref().map(|o| (r.name.as_str(), o))),
    );

    let output = FrontierOutput {
        seed,
        assets: input.assets.assets().to_vec(),
        strategies: reports,
        weight_comparison,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo rejection sampling over the weight simplex",
        &serde_json::json!({
            "n_assets": stats.n_assets(),
            "target_samples": input.config.target_samples,
            "attempt_budget": input.config.attempt_budget(),
            "block_size": input.config.block_size,
            "risk_free_rate": input.config.risk_free_rate,
            "seed": seed,
            "sampling": "uniform simplex draws filtered by caps (not uniform over the feasible region)",
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn validate_strategies(
    strategies: &[StrategyDefinition],
    classes: &AssetClasses,
    warnings: &mut Vec<String>,
) -> FrontierResult<()> {
    let mut names = HashSet::with_capacity(strategies.len());
    for def in strategies {
        if def.name.trim().is_empty() {
            return Err(FrontierError::invalid("strategies.name", "must not be blank"));
        }
        if !names.insert(def.name.as_str()) {
            return Err(FrontierError::invalid(
                "strategies.name",
                format!("duplicate strategy '{}'", def.name),
            ));
        }
        if let AllocationPolicy::Capped(spec) = &def.policy {
            spec.validate(&def.name, classes, warnings)?;
        }
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn run_strategies(
    runner: &StrategyRunner<'_>,
    strategies: &[StrategyDefinition],
    parallel: bool,
) -> FrontierResult<Vec<StrategyResultSet>> {
    if parallel {
        // collect every outcome first so the reported error is the first in
        // strategy order, not the first to finish
        let results: Vec<FrontierResult<StrategyResultSet>> = strategies
            .par_iter()
            .enumerate()
            .map(|(i, def)| runner.run(def, i))
            .collect();
        results.into_iter().collect()
    } else {
        strategies
            .iter()
            .enumerate()
            .map(|(i, def)| runner.run(def, i))
            .collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn run_strategies(
    runner: &StrategyRunner<'_>,
    strategies: &[StrategyDefinition],
    _parallel: bool,
) -> FrontierResult<Vec<StrategyResultSet>> {
    strategies
        .iter()
        .enumerate()
        .map(|(i, def)| runner.run(def, i))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintSpec;

    fn input() -> FrontierInput {
        serde_json::from_value(serde_json::json!({
            "assets": ["SPY", "AGG", "GLD"],
            "class_lookup": {
                "SPY": "Equity (Large Cap)",
                "AGG": "Fixed Income",
                "GLD": "Commodity"
            },
            "expected_returns": [0.11, 0.03, 0.06],
            "covariance_matrix": [
                [0.030, 0.001, 0.002],
                [0.001, 0.003, 0.001],
                [0.002, 0.001, 0.020]
            ],
            "target_samples": 200,
            "seed": 42
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_from_document() {
        let i = input();
        assert_eq!(i.config.target_samples, 200);
        assert_eq!(i.config.budget_multiplier, 100);
        assert_eq!(i.config.block_size, 256);
        assert_eq!(i.config.seed, Some(42));
        assert!(i.config.parallel);
        assert!(i.strategies.is_empty());
    }

    #[test]
    fn test_presets_used_when_no_strategies() {
        let out = run_frontier(&input()).unwrap();
        let names: Vec<&str> = out
            .result
            .strategies
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["conservative", "aggressive", "unconstrained"]);
        let free = out.result.strategy("unconstrained").unwrap();
        assert_eq!(free.status, RunStatus::Complete);
        assert_eq!(free.attempts, 200);
        assert!(free.optimal.is_some());
    }

    #[test]
    fn test_infeasible_strategy_degrades_gracefully() {
        let mut i = input();
        // three assets cannot all stay under 0.3
        i.strategies = vec![
            presets::unconstrained(),
            StrategyDefinition::capped("impossible", ConstraintSpec::new(0.3, Default::default())),
        ];
        i.config.budget_multiplier = 5;
        let out = run_frontier(&i).unwrap();
        let bad = out.result.strategy("impossible").unwrap();
        assert_eq!(bad.status, RunStatus::BudgetExhausted);
        assert_eq!(bad.attempts, 1_000);
        assert!(bad.optimal.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("impossible")));
        assert!(out.result.optimal("unconstrained").is_some());
        // comparison table only has the strategy with an optimum
        assert!(out
            .result
            .weight_comparison
            .iter()
            .all(|row| row.weights.len() == 1));
    }

    #[test]
    fn test_duplicate_strategy_names_rejected() {
        let mut i = input();
        i.strategies = vec![presets::unconstrained(), presets::unconstrained()];
        assert!(matches!(
            run_frontier(&i),
            Err(FrontierError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_shape_error_halts_before_sampling() {
        let mut i = input();
        i.expected_returns.pop();
        assert!(matches!(
            run_frontier(&i),
            Err(FrontierError::InvalidInputShape { .. })
        ));
    }

    #[test]
    fn test_document_without_seed_uses_fixed_seed() {
        let mut doc = serde_json::to_value(input()).unwrap();
        doc.as_object_mut().unwrap().remove("seed");
        let mut i: FrontierInput = serde_json::from_value(doc).unwrap();
        i.config.target_samples = 20;
        let out = run_frontier(&i).unwrap();
        assert_eq!(out.result.seed, 42);
        i.config.seed = Some(42);
        assert_eq!(run_frontier(&i).unwrap().result.strategies, out.result.strategies);
    }

    #[test]
    fn test_unseeded_run_reports_seed() {
        let mut i = input();
        i.config.seed = None;
        i.config.target_samples = 20;
        let first = run_frontier(&i).unwrap();
        i.config.seed = Some(first.result.seed);
        let replay = run_frontier(&i).unwrap();
        assert_eq!(first.result.strategies, replay.result.strategies);
    }
}
