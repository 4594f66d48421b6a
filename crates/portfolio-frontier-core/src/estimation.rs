use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::warn;

use crate::error::FrontierError;
use crate::types::{with_metadata, ComputationOutput};
use crate::universe::{AssetUniverse, MarketStatistics};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A dated closing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Closing prices of one asset, in any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPriceHistory {
    pub asset: String,
    pub prices: Vec<PricePoint>,
}

/// Input for estimating annualized statistics from price histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryInput {
    pub histories: Vec<AssetPriceHistory>,
    /// Return periods per year used for annualization (252 for daily data).
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Minimum share of calendar dates an asset must cover after
    /// forward-filling to be retained.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
}

fn default_periods_per_year() -> f64 {
    252.0
}

fn default_min_coverage() -> f64 {
    0.95
}

/// Annualized statistics for the retained assets.
///
/// Field names match the frontier input document so the output can be
/// pasted into a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedStatistics {
    pub assets: Vec<String>,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Vec<Vec<f64>>,
    pub correlation_matrix: Vec<Vec<f64>>,
    pub observations: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dropped_assets: Vec<String>,
}

impl EstimatedStatistics {
    pub fn market_statistics(&self) -> FrontierResult<MarketStatistics> {
        MarketStatistics::new(
            AssetUniverse::new(self.assets.clone())?,
            self.expected_returns.clone(),
            self.covariance_matrix.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate annualized mean returns and covariance from dated closes.
///
/// Prices are aligned on the union of all dates and forward-filled. Assets
/// covering less than `min_coverage` of the calendar are dropped. Simple
/// period returns are taken only where every retained asset has a price on
/// both dates; covariance is the sample (n - 1) estimate.
pub fn estimate_statistics(
    input: &PriceHistoryInput,
) -> FrontierResult<ComputationOutput<EstimatedStatistics>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let calendar: Vec<NaiveDate> = input
        .histories
        .iter()
        .flat_map(|h| h.prices.iter().map(|p| p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut assets = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = Vec::new();
    let mut dropped_assets = Vec::new();

    for history in &input.histories {
        let column = forward_filled(history, &calendar)?;
        let covered = column.iter().filter(|c| c.is_some()).count();
        let coverage = covered as f64 / calendar.len() as f64;
        if coverage < input.min_coverage {
            let msg = format!(
                "asset '{}' dropped: coverage {:.1}% below {:.1}%",
                history.asset,
                coverage * 100.0,
                input.min_coverage * 100.0
            );
            warn!("{msg}");
            warnings.push(msg);
            dropped_assets.push(history.asset.clone());
            continue;
        }
        assets.push(history.asset.clone());
        columns.push(column);
    }

    if assets.is_empty() {
        return Err(FrontierError::InsufficientData(
            "no asset meets the coverage threshold".into(),
        ));
    }

    // Period returns where every retained asset is priced on both dates.
    let n = assets.len();
    let mut returns: Vec<Vec<f64>> = vec![Vec::new(); n];
    let mut first_return_date = None;
    let mut last_return_date = None;
    for t in 1..calendar.len() {
        let row: Option<Vec<f64>> = columns
            .iter()
            .map(|col| match (col[t - 1], col[t]) {
                (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
                _ => None,
            })
            .collect();
        if let Some(row) = row {
            for (series, r) in returns.iter_mut().zip(row) {
                series.push(r);
            }
            first_return_date.get_or_insert(calendar[t]);
            last_return_date = Some(calendar[t]);
        }
    }

    let observations = returns[0].len();
    let (start_date, end_date) = match (first_return_date, last_return_date) {
        (Some(s), Some(e)) if observations >= 2 => (s, e),
        _ => {
            return Err(FrontierError::InsufficientData(format!(
                "need at least 2 aligned return observations, got {observations}"
            )))
        }
    };

    let ppy = input.periods_per_year;
    let expected_returns: Vec<f64> = returns.iter().map(|r| r.iter().mean() * ppy).collect();
    let mut covariance_matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = returns[i].iter().covariance(returns[j].iter()) * ppy;
            covariance_matrix[i][j] = c;
            covariance_matrix[j][i] = c;
        }
    }

    let stats = MarketStatistics::new(
        AssetUniverse::new(assets.clone())?,
        expected_returns.clone(),
        covariance_matrix.clone(),
    )?;

    let output = EstimatedStatistics {
        assets,
        expected_returns,
        covariance_matrix,
        correlation_matrix: stats.correlation_matrix(),
        observations,
        start_date,
        end_date,
        dropped_assets,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Annualized mean and sample covariance of simple returns",
        &serde_json::json!({
            "periods_per_year": ppy,
            "min_coverage": input.min_coverage,
            "calendar_dates": calendar.len(),
            "fill": "forward",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &PriceHistoryInput) -> FrontierResult<()> {
    if input.histories.is_empty() {
        return Err(FrontierError::InsufficientData(
            "at least one price history is required".into(),
        ));
    }
    AssetUniverse::new(input.histories.iter().map(|h| h.asset.clone()).collect())?;

    if !(input.periods_per_year.is_finite() && input.periods_per_year > 0.0) {
        return Err(FrontierError::invalid(
            "periods_per_year",
            "must be positive",
        ));
    }
    if !(0.0..=1.0).contains(&input.min_coverage) {
        return Err(FrontierError::invalid("min_coverage", "must be in [0, 1]"));
    }
    for h in &input.histories {
        if let Some(p) = h.prices.iter().find(|p| !(p.close.is_finite() && p.close > 0.0)) {
            return Err(FrontierError::invalid(
                format!("{}.prices", h.asset),
                format!("close on {} must be positive, got {}", p.date, p.close),
            ));
        }
    }
    Ok(())
}

/// The asset's closes laid out on `calendar`, gaps carried forward from the
/// last known close. Dates before the first close stay empty.
fn forward_filled(
    history: &AssetPriceHistory,
    calendar: &[NaiveDate],
) -> FrontierResult<Vec<Option<f64>>> {
    let mut by_date = BTreeMap::new();
    for p in &history.prices {
        if by_date.insert(p.date, p.close).is_some() {
            return Err(FrontierError::invalid(
                format!("{}.prices", history.asset),
                format!("duplicate close for {}", p.date),
            ));
        }
    }

    let mut last = None;
    Ok(calendar
        .iter()
        .map(|d| {
            if let Some(&close) = by_date.get(d) {
                last = Some(close);
            }
            last
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn history(asset: &str, closes: &[(u32, f64)]) -> AssetPriceHistory {
        AssetPriceHistory {
            asset: asset.into(),
            prices: closes
                .iter()
                .map(|&(d, close)| PricePoint { date: day(d), close })
                .collect(),
        }
    }

    fn input(histories: Vec<AssetPriceHistory>) -> PriceHistoryInput {
        PriceHistoryInput {
            histories,
            periods_per_year: 252.0,
            min_coverage: 0.95,
        }
    }

    #[test]
    fn test_annualized_mean_and_covariance() {
        // returns: A = [0.1, -0.1, 0.1], B = [0.0, 0.1, 0.0]
        let a = history("A", &[(1, 100.0), (2, 110.0), (3, 99.0), (4, 108.9)]);
        let b = history("B", &[(1, 50.0), (2, 50.0), (3, 55.0), (4, 55.0)]);
        let out = estimate_statistics(&input(vec![a, b])).unwrap().result;

        assert_eq!(out.observations, 3);
        assert_eq!(out.start_date, day(2));
        assert_eq!(out.end_date, day(4));

        let mean_a = 0.1 / 3.0;
        assert!((out.expected_returns[0] - mean_a * 252.0).abs() < 1e-9);
        assert!((out.expected_returns[1] - 0.1 / 3.0 * 252.0).abs() < 1e-9);

        // sample variance of A: deviations 2/30, -4/30, 2/30
        let var_a = ((2.0f64 / 30.0).powi(2) * 2.0 + (4.0f64 / 30.0).powi(2)) / 2.0;
        assert!((out.covariance_matrix[0][0] - var_a * 252.0).abs() < 1e-9);
        assert_eq!(out.covariance_matrix[0][1], out.covariance_matrix[1][0]);
        assert!(out.covariance_matrix[0][1] < 0.0);
        assert!((out.correlation_matrix[0][0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_fill_bridges_gaps() {
        // B misses day 3; carried forward, so its return on day 3 is 0
        let a = history("A", &[(1, 100.0), (2, 101.0), (3, 102.0), (4, 103.0)]);
        let b = history("B", &[(1, 10.0), (2, 11.0), (4, 12.1)]);
        let mut i = input(vec![a, b]);
        i.min_coverage = 0.5;
        let out = estimate_statistics(&i).unwrap().result;
        assert_eq!(out.observations, 3);
        assert!(out.dropped_assets.is_empty());

        // B returns [0.1, 0.0, 0.1]: mean 1/15, deviations 1/30, -2/30, 1/30
        assert!((out.expected_returns[1] - 252.0 / 15.0).abs() < 1e-9);
        let var_b = (1.0 + 4.0 + 1.0) / 900.0 / 2.0;
        assert!((out.covariance_matrix[1][1] - var_b * 252.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_coverage_asset_dropped() {
        let a = history("A", &[(1, 100.0), (2, 101.0), (3, 102.0), (4, 103.0)]);
        // B starts late: only 2 of 4 calendar dates after forward fill
        let b = history("B", &[(3, 10.0), (4, 11.0)]);
        let out = estimate_statistics(&input(vec![a, b])).unwrap();
        assert_eq!(out.result.assets, vec!["A".to_string()]);
        assert_eq!(out.result.dropped_assets, vec!["B".to_string()]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.result.observations, 3);
    }

    #[test]
    fn test_leading_gap_rows_skipped() {
        let a = history("A", &[(1, 100.0), (2, 101.0), (3, 102.0), (4, 103.0)]);
        let b = history("B", &[(2, 10.0), (3, 11.0), (4, 12.0)]);
        let mut i = input(vec![a, b]);
        i.min_coverage = 0.7;
        let out = estimate_statistics(&i).unwrap().result;
        // day 2 has no prior close for B
        assert_eq!(out.observations, 2);
        assert_eq!(out.start_date, day(3));
    }

    #[test]
    fn test_insufficient_observations() {
        let a = history("A", &[(1, 100.0), (2, 101.0)]);
        assert!(matches!(
            estimate_statistics(&input(vec![a])),
            Err(FrontierError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let a = history("A", &[(1, 100.0), (2, 0.0), (3, 101.0)]);
        assert!(matches!(
            estimate_statistics(&input(vec![a])),
            Err(FrontierError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_estimate_feeds_market_statistics() {
        let a = history("A", &[(1, 100.0), (2, 110.0), (3, 99.0), (4, 108.9)]);
        let b = history("B", &[(1, 50.0), (2, 50.0), (3, 55.0), (4, 55.0)]);
        let out = estimate_statistics(&input(vec![a, b])).unwrap().result;
        let stats = out.market_statistics().unwrap();
        assert_eq!(stats.n_assets(), 2);
        assert_eq!(stats.universe().assets(), out.assets.as_slice());
    }
}
