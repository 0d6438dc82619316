use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Shape of the catastrophe-probability curve.
///
/// All curves map the filling ratio of the common pool (pool over the pair's
/// total initial wealth) to a loss probability:
///
/// - `Linear`: `1 - ratio * lambda`
/// - `Power`: `1 - ratio ^ lambda`
/// - `Logistic`: `1 / (1 + exp(lambda * (ratio - 1/2)))`, a smooth step that
///   drops from high to low risk around the half-filled pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCurve {
    Linear,
    Power,
    Logistic,
}

impl RiskCurve {
    /// Compute the loss probability for the given pool size.
    ///
    /// The denominator is guarded with `max(1, total)` so an empty pair
    /// cannot divide by zero.
    ///
    /// # Errors
    /// Returns an error if the curve leaves `[0, 1]` for these parameters,
    /// which signals a misconfigured `lambda` rather than a value to clamp.
    pub fn loss_probability(self, pool: f64, total: f64, lambda: f64) -> Result<f64> {
        let ratio = pool / total.max(1.0);
        let prob = match self {
            RiskCurve::Linear => 1.0 - ratio * lambda,
            RiskCurve::Power => 1.0 - ratio.powf(lambda),
            RiskCurve::Logistic => 1.0 / (1.0 + (lambda * (ratio - 0.5)).exp()),
        };
        if !(0.0..=1.0).contains(&prob) {
            bail!("loss probability must be in the range [0.0, 1.0], but is {prob}");
        }
        Ok(prob)
    }
}

/// Which rounds of a match are eligible for a catastrophe check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRounds {
    Every,
    First,
    Last,
    Random,
}

impl RiskRounds {
    /// Whether `round` is gated for a catastrophe check.
    ///
    /// `drawn` is the round index drawn once per match for [`RiskRounds::Random`]
    /// and ignored by the other kinds.
    pub fn selects(self, round: usize, n_rounds: usize, drawn: Option<usize>) -> bool {
        match self {
            RiskRounds::Every => true,
            RiskRounds::First => round == 0,
            RiskRounds::Last => round + 1 == n_rounds,
            RiskRounds::Random => drawn == Some(round),
        }
    }
}
