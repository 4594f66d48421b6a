use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FrontierError;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::universe::{AssetUniverse, MarketStatistics};
use crate::{FrontierResult, WEIGHT_TOLERANCE};

/// Negative variances down to this magnitude are rounding noise and are
/// clamped to zero; anything below means the covariance is not PSD.
pub const NEGATIVE_VARIANCE_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Return, risk and Sharpe ratio of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub expected_return: Rate,
    pub volatility: Rate,
    pub sharpe: f64,
}

/// Input for evaluating a single, caller-chosen allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateInput {
    pub assets: AssetUniverse,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Vec<Vec<f64>>,
    pub weights: Vec<Weight>,
    #[serde(default)]
    pub risk_free_rate: Rate,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// w' Sigma w
fn quadratic_form(w: &[f64], sigma: &[Vec<f64>]) -> f64 {
    w.iter()
        .zip(sigma)
        .map(|(wi, row)| wi * vec_dot(row, w))
        .sum()
}

fn compute_sharpe(ret: f64, rf: f64, vol: f64) -> f64 {
    if vol == 0.0 {
        0.0
    } else {
        (ret - rf) / vol
    }
}

/// Evaluate `weights` against the market statistics.
///
/// Volatility is clamped to zero for tiny negative variances; a Sharpe
/// ratio over zero volatility is reported as 0.
pub fn evaluate_portfolio(
    weights: &[f64],
    stats: &MarketStatistics,
    risk_free_rate: f64,
) -> FrontierResult<PortfolioMetrics> {
    if weights.len() != stats.n_assets() {
        return Err(FrontierError::shape(format!(
            "weight vector has {} entries for {} assets",
            weights.len(),
            stats.n_assets()
        )));
    }

    let expected_return = vec_dot(weights, stats.expected_returns());
    if !expected_return.is_finite() {
        return Err(FrontierError::InputDataError(
            "portfolio expected return is not finite".into(),
        ));
    }

    let variance = quadratic_form(weights, stats.covariance());
    let variance = if variance.is_finite() && variance >= 0.0 {
        variance
    } else if variance < 0.0 && variance >= -NEGATIVE_VARIANCE_TOLERANCE {
        0.0
    } else {
        return Err(FrontierError::InputDataError(format!(
            "portfolio variance {variance} is not a valid variance; covariance matrix is ill-conditioned or not positive semi-definite"
        )));
    };
    let volatility = variance.sqrt();

    Ok(PortfolioMetrics {
        expected_return,
        volatility,
        sharpe: compute_sharpe(expected_return, risk_free_rate, volatility),
    })
}

/// Evaluate a caller-supplied allocation, wrapped in the standard envelope.
pub fn evaluate_allocation(
    input: &EvaluateInput,
) -> FrontierResult<ComputationOutput<PortfolioMetrics>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let stats = MarketStatistics::new(
        input.assets.clone(),
        input.expected_returns.clone(),
        input.covariance_matrix.clone(),
    )?;

    if let Some(w) = input.weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(FrontierError::invalid(
            "weights",
            format!("weights must be finite and non-negative, got {w}"),
        ));
    }
    let total: f64 = input.weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        warnings.push(format!("weights sum to {total:.6}, not 1"));
    }

    let metrics = evaluate_portfolio(&input.weights, &stats, input.risk_free_rate)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Portfolio mean-variance evaluation",
        &serde_json::json!({
            "n_assets": stats.n_assets(),
            "risk_free_rate": input.risk_free_rate,
        }),
        warnings,
        elapsed,
        metrics,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
