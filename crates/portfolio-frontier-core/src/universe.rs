use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

use crate::error::FrontierError;
use crate::{FrontierResult, WEIGHT_TOLERANCE};

// ---------------------------------------------------------------------------
// Asset universe
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free list of asset identifiers.
///
/// The order fixes the index of every asset in the mean-return vector, the
/// covariance matrix, and every sampled weight vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetUniverse {
    assets: Vec<String>,
}

impl AssetUniverse {
    pub fn new(assets: Vec<String>) -> FrontierResult<Self> {
        if assets.is_empty() {
            return Err(FrontierError::shape("asset universe is empty"));
        }
        let mut seen = HashSet::with_capacity(assets.len());
        for id in &assets {
            if id.trim().is_empty() {
                return Err(FrontierError::shape("asset identifier must not be blank"));
            }
            if !seen.insert(id.as_str()) {
                return Err(FrontierError::shape(format!(
                    "duplicate asset identifier '{id}'"
                )));
            }
        }
        Ok(Self { assets })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for AssetUniverse {
    type Error = FrontierError;

    fn try_from(assets: Vec<String>) -> Result<Self, Self::Error> {
        AssetUniverse::new(assets)
    }
}

impl From<AssetUniverse> for Vec<String> {
    fn from(u: AssetUniverse) -> Self {
        u.assets
    }
}

// ---------------------------------------------------------------------------
// Asset classes
// ---------------------------------------------------------------------------

/// Caller-supplied taxonomy: asset identifier -> asset-class label.
pub type ClassLookup = BTreeMap<String, String>;

/// Class labels resolved against a universe, one per asset in universe order.
///
/// Each asset also carries the index of its class within `names()`, so
/// per-class aggregation is a plain vector accumulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetClasses {
    assets: Vec<String>,
    labels: Vec<String>,
    names: Vec<String>,
    class_index: Vec<usize>,
}

impl AssetClasses {
    /// Resolve `lookup` against `universe`.
    ///
    /// Every asset must have a class. Lookup entries for identifiers outside
    /// the universe are ignored and reported through `warnings`.
    pub fn resolve(
        universe: &AssetUniverse,
        lookup: &ClassLookup,
        warnings: &mut Vec<String>,
    ) -> FrontierResult<Self> {
        let mut labels = Vec::with_capacity(universe.len());
        let mut missing = Vec::new();
        for id in universe.iter() {
            match lookup.get(id) {
                Some(class) if !class.trim().is_empty() => labels.push(class.clone()),
                _ => missing.push(id.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(FrontierError::shape(format!(
                "class lookup has no class for: {}",
                missing.join(", ")
            )));
        }

        for id in lookup.keys() {
            if universe.index_of(id).is_none() {
                let msg = format!("class lookup entry '{id}' is not in the asset universe; ignored");
                warn!("{msg}");
                warnings.push(msg);
            }
        }

        let names: Vec<String> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let class_index = labels
            .iter()
            .map(|l| names.binary_search(l).unwrap_or_default())
            .collect();

        Ok(Self {
            assets: universe.assets().to_vec(),
            labels,
            names,
            class_index,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Identifier of asset `index` in the resolved universe.
    pub fn asset_id(&self, index: usize) -> &str {
        &self.assets[index]
    }

    pub fn class_of(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Distinct class labels in sorted order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index into `names()` of the class of asset `index`.
    pub fn class_index_of(&self, index: usize) -> usize {
        self.class_index[index]
    }

    /// Sum `weights` per class, indexed like `names()`.
    pub fn aggregate(&self, weights: &[f64]) -> Vec<f64> {
        let mut sums = vec![0.0; self.names.len()];
        for (w, &c) in weights.iter().zip(&self.class_index) {
            sums[c] += w;
        }
        sums
    }
}

// ---------------------------------------------------------------------------
// Market statistics
// ---------------------------------------------------------------------------

/// Annualized mean returns and covariance for a fixed universe.
///
/// Validated once on construction and immutable afterwards, so it can be
/// shared by reference across strategy runs and worker threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStatistics {
    universe: AssetUniverse,
    expected_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
}

impl MarketStatistics {
    pub fn new(
        universe: AssetUniverse,
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> FrontierResult<Self> {
        let n = universe.len();

        if expected_returns.len() != n {
            return Err(FrontierError::shape(format!(
                "expected_returns has {} entries for {} assets",
                expected_returns.len(),
                n
            )));
        }
        if covariance.len() != n {
            return Err(FrontierError::shape(format!(
                "covariance_matrix has {} rows for {} assets",
                covariance.len(),
                n
            )));
        }
        for (i, row) in covariance.iter().enumerate() {
            if row.len() != n {
                return Err(FrontierError::shape(format!(
                    "covariance_matrix row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
        }

        if let Some(i) = expected_returns.iter().position(|r| !r.is_finite()) {
            return Err(FrontierError::InputDataError(format!(
                "expected return for '{}' is not finite",
                universe.assets()[i]
            )));
        }
        for i in 0..n {
            for j in 0..n {
                let c = covariance[i][j];
                if !c.is_finite() {
                    return Err(FrontierError::InputDataError(format!(
                        "covariance_matrix[{i}][{j}] is not finite"
                    )));
                }
                if j > i && (c - covariance[j][i]).abs() > WEIGHT_TOLERANCE {
                    return Err(FrontierError::InputDataError(format!(
                        "covariance_matrix is not symmetric at ({i}, {j}): {c} vs {}",
                        covariance[j][i]
                    )));
                }
            }
            if covariance[i][i] < 0.0 {
                return Err(FrontierError::InputDataError(format!(
                    "negative variance {} for '{}'",
                    covariance[i][i],
                    universe.assets()[i]
                )));
            }
        }

        Ok(Self {
            universe,
            expected_returns,
            covariance,
        })
    }

    pub fn universe(&self) -> &AssetUniverse {
        &self.universe
    }

    pub fn n_assets(&self) -> usize {
        self.universe.len()
    }

    pub fn expected_returns(&self) -> &[f64] {
        &self.expected_returns
    }

    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    /// Per-asset volatility: square root of the covariance diagonal.
    pub fn asset_volatilities(&self) -> Vec<f64> {
        (0..self.n_assets())
            .map(|i| self.covariance[i][i].sqrt())
            .collect()
    }

    /// Pearson correlation matrix derived from the covariance.
    ///
    /// Pairs involving a zero-variance asset are reported as 0.
    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        let vols = self.asset_volatilities();
        let n = self.n_assets();
        let mut corr = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let denom = vols[i] * vols[j];
                if denom > 0.0 {
                    corr[i][j] = self.covariance[i][j] / denom;
                }
            }
        }
        corr
    }
}
