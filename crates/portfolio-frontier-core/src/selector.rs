use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FrontierError;
use crate::metrics::PortfolioMetrics;
use crate::runner::StrategyResultSet;
use crate::types::Weight;
use crate::universe::{AssetClasses, AssetUniverse};
use crate::FrontierResult;

/// Weight of one asset in an optimal portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub class: String,
    pub weight: Weight,
}

/// Aggregate weight of one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeight {
    pub class: String,
    pub weight: Weight,
}

/// The max-Sharpe portfolio of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalPortfolio {
    /// Position of the portfolio in its result set.
    pub index: usize,
    /// Weights in universe order.
    pub weights: Vec<AssetWeight>,
    pub metrics: PortfolioMetrics,
    /// Per-class totals, largest first.
    pub class_allocation: Vec<ClassWeight>,
}

impl OptimalPortfolio {
    pub fn weight_of(&self, asset: &str) -> Option<Weight> {
        self.weights
            .iter()
            .find(|w| w.asset == asset)
            .map(|w| w.weight)
    }
}

/// Index of the first sample with the highest Sharpe ratio.
pub fn max_sharpe_index(result: &StrategyResultSet) -> FrontierResult<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, m) in result.metrics().enumerate() {
        match best {
            Some((_, s)) if m.sharpe <= s => {}
            _ => best = Some((i, m.sharpe)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| FrontierError::EmptyResultSet {
            strategy: result.strategy.clone(),
        })
}

/// Pick the max-Sharpe portfolio of `result`, ties going to the earliest.
pub fn select_optimal(
    result: &StrategyResultSet,
    universe: &AssetUniverse,
    classes: &AssetClasses,
) -> FrontierResult<OptimalPortfolio> {
    let index = max_sharpe_index(result)?;
    let sample = &result.samples[index];

    let weights = universe
        .iter()
        .zip(&sample.weights)
        .enumerate()
        .map(|(i, (asset, &weight))| AssetWeight {
            asset: asset.to_string(),
            class: classes.class_of(i).to_string(),
            weight,
        })
        .collect();

    Ok(OptimalPortfolio {
        index,
        weights,
        metrics: sample.metrics,
        class_allocation: class_allocation(&sample.weights, classes),
    })
}

/// Total weight per class, sorted by descending weight then class name.
pub fn class_allocation(weights: &[f64], classes: &AssetClasses) -> Vec<ClassWeight> {
    let mut alloc: Vec<ClassWeight> = classes
        .names()
        .iter()
        .zip(classes.aggregate(weights))
        .map(|(class, weight)| ClassWeight {
            class: class.clone(),
            weight,
        })
        .collect();
    alloc.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.class.cmp(&b.class))
    });
    alloc
}

/// One asset's optimal weight under each strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightComparisonRow {
    pub asset: String,
    pub weights: BTreeMap<String, Weight>,
}

/// Side-by-side optimal weights, one row per asset sorted by identifier.
///
/// Strategies without an optimal portfolio contribute no column.
pub fn weight_comparison<'a>(
    optima: impl IntoIterator<Item = (&'a str, &'a OptimalPortfolio)>,
) -> Vec<WeightComparisonRow> {
    let mut rows: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for (strategy, optimal) in optima {
        for w in &optimal.weights {
            rows.entry(w.asset.clone())
                .or_default()
                .insert(strategy.to_string(), w.weight);
        }
    }
    rows.into_iter()
        .map(|(asset, weights)| WeightComparisonRow { asset, weights })
        .collect()
}
