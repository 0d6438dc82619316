use serde::{Deserialize, Serialize};

/// Wealth class of a player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    Rich,
    Poor,
}

impl Class {
    pub const ALL: [Class; 2] = [Class::Rich, Class::Poor];
}

/// One round of a player's playbook.
///
/// While the common pool is at or below the fraction `tau` of the pair's
/// total initial wealth the player offers `a`, otherwise `b`. The amounts
/// are absolute wealth units, not fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRule {
    pub tau: f64,
    pub a: f64,
    pub b: f64,
}

/// Per-round playbook of one player slot, of length `n_rounds`.
pub type Strategy = Vec<RoundRule>;

/// The two strategy populations, one per wealth class.
///
/// Sizes are fixed for the whole simulation; only the engine replaces
/// strategy content between generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    rich: Vec<Strategy>,
    poor: Vec<Strategy>,
}

impl Population {
    pub fn new(rich: Vec<Strategy>, poor: Vec<Strategy>) -> Self {
        Self { rich, poor }
    }

    pub fn strategies(&self, class: Class) -> &[Strategy] {
        match class {
            Class::Rich => &self.rich,
            Class::Poor => &self.poor,
        }
    }

    pub fn strategies_mut(&mut self, class: Class) -> &mut Vec<Strategy> {
        match class {
            Class::Rich => &mut self.rich,
            Class::Poor => &mut self.poor,
        }
    }
}

/// Tournament aggregates of one generation.
///
/// `contrib_*` hold the realized contribution at each round averaged over
/// the participations of that class; `mean_payoff_*` the class mean of the
/// per-player average payoff that fitness is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenStats {
    pub contrib_rich: Vec<f64>,
    pub contrib_poor: Vec<f64>,

    pub mean_payoff_rich: f64,
    pub mean_payoff_poor: f64,
}

impl GenStats {
    pub fn zeroed(n_rounds: usize) -> Self {
        Self {
            contrib_rich: vec![0.0; n_rounds],
            contrib_poor: vec![0.0; n_rounds],
            mean_payoff_rich: 0.0,
            mean_payoff_poor: 0.0,
        }
    }

    pub fn contrib(&self, class: Class) -> &[f64] {
        match class {
            Class::Rich => &self.contrib_rich,
            Class::Poor => &self.contrib_poor,
        }
    }

    pub fn mean_payoff(&self, class: Class) -> f64 {
        match class {
            Class::Rich => self.mean_payoff_rich,
            Class::Poor => self.mean_payoff_poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Completed generations so far.
    pub generation: usize,

    pub population: Population,

    /// Aggregates of the last completed generation.
    pub stats: GenStats,
}
