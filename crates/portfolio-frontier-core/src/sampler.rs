use rand::Rng;

use crate::error::FrontierError;
use crate::FrontierResult;

/// A weight vector on the simplex plus the number of all-zero draws that
/// had to be discarded to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexDraw {
    pub weights: Vec<f64>,
    pub degenerate_draws: u32,
}

/// Draw `n` uniform [0, 1) values and normalize them by their sum.
///
/// A draw whose values are all exactly zero cannot be normalized and is
/// redrawn. Consumes entropy from `rng` only.
pub fn sample_weights<R: Rng + ?Sized>(rng: &mut R, n: usize) -> FrontierResult<SimplexDraw> {
    if n == 0 {
        return Err(FrontierError::shape("cannot sample weights for zero assets"));
    }

    let mut degenerate_draws = 0u32;
    loop {
        let mut weights: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 {
            weights.iter_mut().for_each(|w| *w /= sum);
            return Ok(SimplexDraw {
                weights,
                degenerate_draws,
            });
        }
        degenerate_draws += 1;
    }
}
