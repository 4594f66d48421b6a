use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::error::FrontierError;
use crate::universe::AssetClasses;
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Feasibility region of a capped strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// Maximum weight of any single asset, in (0, 1].
    pub asset_max: f64,
    /// Maximum aggregate weight per asset class, each in (0, 1].
    /// Classes not listed here are uncapped.
    #[serde(default)]
    pub class_max: BTreeMap<String, f64>,
}

/// How a strategy filters sampled weight vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Every candidate is accepted; no cap is evaluated.
    Unconstrained,
    /// Candidates must respect the asset and class caps.
    Capped(ConstraintSpec),
}

/// A named allocation regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub name: String,
    #[serde(flatten)]
    pub policy: AllocationPolicy,
}

/// First cap found to be breached by a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintViolation {
    AssetCapExceeded {
        asset: String,
        weight: f64,
        limit: f64,
    },
    ClassCapExceeded {
        class: String,
        weight: f64,
        limit: f64,
    },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetCapExceeded {
                asset,
                weight,
                limit,
            } => write!(f, "asset '{asset}' weight {weight:.4} exceeds cap {limit:.4}"),
            Self::ClassCapExceeded {
                class,
                weight,
                limit,
            } => write!(f, "class '{class}' weight {weight:.4} exceeds cap {limit:.4}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Constraint specification
// ---------------------------------------------------------------------------

impl ConstraintSpec {
    pub fn new(asset_max: f64, class_max: BTreeMap<String, f64>) -> Self {
        Self {
            asset_max,
            class_max,
        }
    }

    /// Asset cap 1.0 and every listed class capped at 1.0.
    ///
    /// Describes the unconstrained regime as data; the validator still
    /// bypasses it through [`AllocationPolicy::Unconstrained`].
    pub fn unbounded<'a>(classes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            asset_max: 1.0,
            class_max: classes.into_iter().map(|c| (c.to_string(), 1.0)).collect(),
        }
    }

    pub fn class_cap(&self, class: &str) -> Option<f64> {
        self.class_max.get(class).copied()
    }

    /// Check caps lie in (0, 1]. Caps for classes no asset carries are
    /// accepted and reported through `warnings`.
    pub fn validate(
        &self,
        strategy: &str,
        classes: &AssetClasses,
        warnings: &mut Vec<String>,
    ) -> FrontierResult<()> {
        if !is_unit_cap(self.asset_max) {
            return Err(FrontierError::invalid(
                format!("{strategy}.asset_max"),
                format!("must be in (0, 1], got {}", self.asset_max),
            ));
        }
        for (class, &cap) in &self.class_max {
            if !is_unit_cap(cap) {
                return Err(FrontierError::invalid(
                    format!("{strategy}.class_max.{class}"),
                    format!("must be in (0, 1], got {cap}"),
                ));
            }
            if classes.names().binary_search(class).is_err() {
                let msg = format!(
                    "strategy '{strategy}' caps class '{class}' which no asset belongs to"
                );
                warn!("{msg}");
                warnings.push(msg);
            }
        }
        Ok(())
    }
}

fn is_unit_cap(v: f64) -> bool {
    v.is_finite() && v > 0.0 && v <= 1.0
}

impl AllocationPolicy {
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, AllocationPolicy::Unconstrained)
    }
}

impl StrategyDefinition {
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: AllocationPolicy::Unconstrained,
        }
    }

    pub fn capped(name: impl Into<String>, spec: ConstraintSpec) -> Self {
        Self {
            name: name.into(),
            policy: AllocationPolicy::Capped(spec),
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A policy resolved against the class assignment of a universe.
///
/// Class caps are laid out by class index so that checking a candidate
/// needs no string lookups.
#[derive(Debug, Clone)]
pub struct ConstraintValidator<'a> {
    classes: &'a AssetClasses,
    rule: Rule,
}

#[derive(Debug, Clone)]
enum Rule {
    Bypass,
    Caps {
        asset_max: f64,
        class_caps: Vec<Option<f64>>,
    },
}

impl<'a> ConstraintValidator<'a> {
    pub fn new(policy: &AllocationPolicy, classes: &'a AssetClasses) -> Self {
        let rule = match policy {
            AllocationPolicy::Unconstrained => Rule::Bypass,
            AllocationPolicy::Capped(spec) => Rule::Caps {
                asset_max: spec.asset_max,
                class_caps: classes
                    .names()
                    .iter()
                    .map(|name| spec.class_cap(name))
                    .collect(),
            },
        };
        Self { classes, rule }
    }

    /// Accept or reject a candidate weight vector.
    pub fn accepts(&self, weights: &[f64]) -> bool {
        self.first_violation(weights).is_none()
    }

    /// The first breached cap: asset caps are checked before class caps.
    ///
    /// `weights` must be in universe order; use [`is_feasible`] for a
    /// length-checked call.
    pub fn first_violation(&self, weights: &[f64]) -> Option<ConstraintViolation> {
        debug_assert_eq!(weights.len(), self.classes.len(), "weight vector length");
        let (asset_max, class_caps) = match &self.rule {
            Rule::Bypass => return None,
            Rule::Caps {
                asset_max,
                class_caps,
            } => (*asset_max, class_caps),
        };

        if let Some((i, &w)) = weights.iter().enumerate().find(|(_, &w)| w > asset_max) {
            return Some(ConstraintViolation::AssetCapExceeded {
                asset: self.classes.asset_id(i).to_string(),
                weight: w,
                limit: asset_max,
            });
        }

        let sums = self.classes.aggregate(weights);
        for (c, (sum, cap)) in sums.iter().zip(class_caps).enumerate() {
            if let Some(limit) = *cap {
                if *sum > limit {
                    return Some(ConstraintViolation::ClassCapExceeded {
                        class: self.classes.names()[c].clone(),
                        weight: *sum,
                        limit,
                    });
                }
            }
        }
        None
    }
}

/// One-shot feasibility check of `weights` under `policy`.
pub fn is_feasible(
    weights: &[f64],
    policy: &AllocationPolicy,
    classes: &AssetClasses,
) -> FrontierResult<bool> {
    if weights.len() != classes.len() {
        return Err(FrontierError::shape(format!(
            "weight vector has {} entries for {} assets",
            weights.len(),
            classes.len()
        )));
    }
    Ok(ConstraintValidator::new(policy, classes).accepts(weights))
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Built-in strategies over a multi-asset ETF taxonomy.
///
/// Class labels match the taxonomy the presets were calibrated on; classes a
/// caller's taxonomy does not use are simply never binding.
pub mod presets {
    use super::*;

    pub const LARGE_CAP: &str = "Equity (Large Cap)";
    pub const TOTAL_MARKET: &str = "Equity (Total Market)";
    pub const FINANCIALS: &str = "Equity (Financials)";
    pub const ENERGY: &str = "Equity (Energy)";
    pub const TECHNOLOGY: &str = "Equity (Technology)";
    pub const INDUSTRIALS: &str = "Equity (Industrials)";
    pub const EQUITY_REAL_ESTATE: &str = "Equity (Real Estate)";
    pub const EMERGING_MARKETS: &str = "Equity (Emerging Markets)";
    pub const FIXED_INCOME: &str = "Fixed Income";
    pub const COMMODITY: &str = "Commodity";

    fn caps(broad_equity: f64, sector: f64, defensive: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        for c in [LARGE_CAP, TOTAL_MARKET] {
            m.insert(c.to_string(), broad_equity);
        }
        for c in [
            FINANCIALS,
            ENERGY,
            TECHNOLOGY,
            INDUSTRIALS,
            EQUITY_REAL_ESTATE,
            EMERGING_MARKETS,
        ] {
            m.insert(c.to_string(), sector);
        }
        for c in [FIXED_INCOME, COMMODITY] {
            m.insert(c.to_string(), defensive);
        }
        m
    }

    /// 15% per asset, 40% broad equity, 20% elsewhere.
    pub fn conservative() -> StrategyDefinition {
        StrategyDefinition::capped("conservative", ConstraintSpec::new(0.15, caps(0.4, 0.2, 0.2)))
    }

    /// 25% per asset, 80% broad equity, 30% sectors, 20% defensive.
    pub fn aggressive() -> StrategyDefinition {
        StrategyDefinition::capped("aggressive", ConstraintSpec::new(0.25, caps(0.8, 0.3, 0.2)))
    }

    pub fn unconstrained() -> StrategyDefinition {
        StrategyDefinition::unconstrained("unconstrained")
    }

    pub fn standard_strategies() -> Vec<StrategyDefinition> {
        vec![conservative(), aggressive(), unconstrained()]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
