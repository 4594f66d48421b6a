use portfolio_frontier_core::constraints::{
    presets, AllocationPolicy, ConstraintSpec, ConstraintValidator, StrategyDefinition,
};
use portfolio_frontier_core::frontier::{run_frontier, FrontierInput};
use portfolio_frontier_core::metrics::evaluate_portfolio;
use portfolio_frontier_core::runner::{RunConfig, RunStatus, StrategyRunner};
use portfolio_frontier_core::sampler::sample_weights;
use portfolio_frontier_core::universe::{AssetClasses, AssetUniverse, ClassLookup, MarketStatistics};
use portfolio_frontier_core::{FrontierError, WEIGHT_TOLERANCE};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

// ===========================================================================
// Twelve-ETF universe with the multi-asset taxonomy used by the presets.
// Statistics are synthetic but shaped like annualized ETF data.
// ===========================================================================

const TICKERS: [(&str, &str); 12] = [
    ("SPY", presets::LARGE_CAP),
    ("QQQ", presets::LARGE_CAP),
    ("VTI", presets::TOTAL_MARKET),
    ("AGG", presets::FIXED_INCOME),
    ("GLD", presets::COMMODITY),
    ("VNQ", "Real Estate"),
    ("XLF", presets::FINANCIALS),
    ("XLE", presets::ENERGY),
    ("XLK", presets::TECHNOLOGY),
    ("XLI", presets::INDUSTRIALS),
    ("XLRE", presets::EQUITY_REAL_ESTATE),
    ("EEM", presets::EMERGING_MARKETS),
];

const MEANS: [f64; 12] = [
    0.12, 0.17, 0.12, 0.02, 0.07, 0.06, 0.11, 0.06, 0.19, 0.11, 0.06, 0.04,
];

const VOLS: [f64; 12] = [
    0.18, 0.22, 0.18, 0.05, 0.14, 0.22, 0.23, 0.31, 0.24, 0.21, 0.21, 0.20,
];

fn etf_input(target: usize, seed: u64) -> FrontierInput {
    // one-factor covariance: sigma_i sigma_j rho, rho = 0.6 off-diagonal
    let n = TICKERS.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let rho = if i == j { 1.0 } else { 0.6 };
            cov[i][j] = VOLS[i] * VOLS[j] * rho;
        }
    }
    // keep the matrix exactly symmetric
    for i in 0..n {
        for j in 0..i {
            cov[i][j] = cov[j][i];
        }
    }

    FrontierInput {
        assets: AssetUniverse::new(TICKERS.iter().map(|(t, _)| t.to_string()).collect()).unwrap(),
        class_lookup: TICKERS
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect(),
        expected_returns: MEANS.to_vec(),
        covariance_matrix: cov,
        strategies: presets::standard_strategies(),
        config: RunConfig {
            target_samples: target,
            // conservative caps accept roughly 1% of draws over twelve assets
            budget_multiplier: 1_000,
            seed: Some(seed),
            ..RunConfig::default()
        },
    }
}

fn resolved(input: &FrontierInput) -> (MarketStatistics, AssetClasses) {
    let stats = MarketStatistics::new(
        input.assets.clone(),
        input.expected_returns.clone(),
        input.covariance_matrix.clone(),
    )
    .unwrap();
    let classes = AssetClasses::resolve(&input.assets, &input.class_lookup, &mut Vec::new()).unwrap();
    (stats, classes)
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

#[test]
fn test_every_draw_is_on_the_simplex() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..2_000 {
        let draw = sample_weights(&mut rng, 12).unwrap();
        assert!(draw.weights.iter().all(|&w| w >= 0.0));
        let sum: f64 = draw.weights.iter().sum();
        assert!((sum - 1.0).abs() < WEIGHT_TOLERANCE);
    }
}

// ---------------------------------------------------------------------------
// Strategy runs
// ---------------------------------------------------------------------------

#[test]
fn test_etf_presets_run() {
    let out = run_frontier(&etf_input(200, 42)).unwrap();
    let result = &out.result;
    assert_eq!(result.assets.len(), 12);

    for report in &result.strategies {
        assert_eq!(report.status, RunStatus::Complete, "{}", report.name);
        assert_eq!(report.accepted, 200);
        assert!(report.optimal.is_some());
    }

    let free = result.strategy("unconstrained").unwrap();
    assert_eq!(free.attempts, 200);
    assert_eq!(free.acceptance_rate, 1.0);

    // tighter caps reject more candidates
    let conservative = result.strategy("conservative").unwrap();
    let aggressive = result.strategy("aggressive").unwrap();
    assert!(conservative.attempts >= aggressive.attempts);
    assert!(aggressive.attempts >= free.attempts);

    assert_eq!(result.weight_comparison.len(), 12);
    assert!(result
        .weight_comparison
        .iter()
        .all(|row| row.weights.len() == 3));
}

#[test]
fn test_accepted_portfolios_satisfy_caps() {
    let input = etf_input(300, 7);
    let out = run_frontier(&input).unwrap();
    let (_, classes) = resolved(&input);

    for report in &out.result.strategies {
        let spec = match &report.policy {
            AllocationPolicy::Capped(spec) => spec,
            AllocationPolicy::Unconstrained => continue,
        };
        for sample in &report.samples.samples {
            let max = sample.weights.iter().cloned().fold(0.0, f64::max);
            assert!(max <= spec.asset_max);
            let sums = classes.aggregate(&sample.weights);
            for (class, sum) in classes.names().iter().zip(sums) {
                if let Some(cap) = spec.class_cap(class) {
                    assert!(sum <= cap, "{class}: {sum} > {cap}");
                }
            }
        }
    }
}

#[test]
fn test_optimal_is_max_sharpe_of_population() {
    let out = run_frontier(&etf_input(250, 11)).unwrap();
    for report in &out.result.strategies {
        let optimal = report.optimal.as_ref().unwrap();
        let best = report
            .samples
            .samples
            .iter()
            .map(|s| s.metrics.sharpe)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(optimal.metrics.sharpe, best);
        // no earlier sample reaches the same Sharpe
        assert!(report.samples.samples[..optimal.index]
            .iter()
            .all(|s| s.metrics.sharpe < best));
        let total: f64 = optimal.class_allocation.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < WEIGHT_TOLERANCE);
    }
}

#[test]
fn test_runs_are_bit_identical() {
    let a = run_frontier(&etf_input(150, 2024)).unwrap();
    let b = run_frontier(&etf_input(150, 2024)).unwrap();
    assert_eq!(a.result, b.result);
}

#[test]
fn test_parallel_flag_does_not_change_results() {
    let mut seq = etf_input(150, 77);
    seq.config.parallel = false;
    let par = etf_input(150, 77);
    assert_eq!(
        run_frontier(&seq).unwrap().result,
        run_frontier(&par).unwrap().result
    );
}

#[test]
fn test_different_seeds_differ() {
    let a = run_frontier(&etf_input(50, 1)).unwrap();
    let b = run_frontier(&etf_input(50, 2)).unwrap();
    assert_ne!(
        a.result.strategies[2].samples.samples,
        b.result.strategies[2].samples.samples
    );
}

#[test]
fn test_infeasible_asset_cap_terminates_at_budget() {
    let mut input = etf_input(100, 5);
    // 12 assets cannot all stay below 1/12
    input.strategies = vec![StrategyDefinition::capped(
        "too_tight",
        ConstraintSpec::new(0.08, BTreeMap::new()),
    )];
    input.config.budget_multiplier = 20;
    let out = run_frontier(&input).unwrap();
    let report = out.result.strategy("too_tight").unwrap();
    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert_eq!(report.attempts, 2_000);
    assert_eq!(report.accepted, 0);
    assert!(report.optimal.is_none());
    assert!(matches!(
        report.samples.require_complete(),
        Err(FrontierError::SamplingBudgetExhausted { .. })
    ));
}

#[test]
fn test_runner_result_matches_validator() {
    let input = etf_input(100, 3);
    let (stats, classes) = resolved(&input);
    let strategy = presets::aggressive();
    let runner = StrategyRunner::new(&stats, &classes, &input.config, 3);
    let result = runner.run(&strategy, 0).unwrap();
    let validator = ConstraintValidator::new(&strategy.policy, &classes);
    for sample in &result.samples {
        assert!(validator.accepts(&sample.weights));
        let m = evaluate_portfolio(&sample.weights, &stats, 0.0).unwrap();
        assert_eq!(m, sample.metrics);
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[test]
fn test_missing_class_is_shape_error() {
    let mut input = etf_input(10, 1);
    input.class_lookup.remove("EEM");
    assert!(matches!(
        run_frontier(&input),
        Err(FrontierError::InvalidInputShape { .. })
    ));
}

#[test]
fn test_covariance_shape_error() {
    let mut input = etf_input(10, 1);
    input.covariance_matrix[3].pop();
    assert!(matches!(
        run_frontier(&input),
        Err(FrontierError::InvalidInputShape { .. })
    ));
}

#[test]
fn test_oversized_target_is_invalid_input() {
    let mut input = etf_input(10, 1);
    input.strategies = vec![StrategyDefinition::capped(
        "tight",
        ConstraintSpec::new(0.05, BTreeMap::new()),
    )];
    input.config.target_samples = 1 << 60;
    input.config.attempt_budget = Some(1 << 60);
    assert!(matches!(
        run_frontier(&input),
        Err(FrontierError::InvalidInput { .. })
    ));
}

#[test]
fn test_bad_cap_is_invalid_input() {
    let mut input = etf_input(10, 1);
    input.strategies = vec![StrategyDefinition::capped(
        "bad",
        ConstraintSpec::new(1.5, BTreeMap::new()),
    )];
    assert!(matches!(
        run_frontier(&input),
        Err(FrontierError::InvalidInput { .. })
    ));
}

#[test]
fn test_yaml_style_document_roundtrips_through_json() {
    let input = etf_input(10, 9);
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(json["target_samples"], 10);
    assert_eq!(json["strategies"][2]["policy"], "unconstrained");
    let back: FrontierInput = serde_json::from_value(json).unwrap();
    assert_eq!(back.config, input.config);
    assert_eq!(back.strategies, input.strategies);
    let lookup: &ClassLookup = &back.class_lookup;
    assert_eq!(lookup["VNQ"], "Real Estate");
}
