use crate::model::Class;
use crate::risk::{RiskCurve, RiskRounds};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub init: InitConfig,
    pub evolution: EvolutionConfig,
    pub output: OutputConfig,
}

/// Mechanics of one pairwise match.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Rounds per match.
    pub n_rounds: usize,

    /// Sensitivity of the risk curve.
    pub lambda: f64,
    /// Shape of the catastrophe-probability curve.
    pub risk_curve: RiskCurve,
    /// Rounds eligible for a catastrophe check.
    pub risk_rounds: RiskRounds,

    /// Fraction of current wealth a rich player loses in a catastrophe.
    pub alpha_rich: f64,
    /// Fraction of current wealth a poor player loses in a catastrophe.
    pub alpha_poor: f64,

    /// Discount payoffs by the expected loss on every gated round instead
    /// of only by losses that actually occurred.
    pub smoothed_payoff: bool,
}

/// Initial condition of a run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Number of rich players.
    pub n_rich: usize,
    /// Number of poor players.
    pub n_poor: usize,

    /// Wealth endowment of each rich player.
    pub wealth_rich: f64,
    /// Wealth endowment of each poor player.
    pub wealth_poor: f64,

    /// RNG seed; omitted means OS entropy.
    pub seed: Option<u64>,
}

/// Selection and mutation parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Matches played per generation.
    pub n_games: usize,

    /// Per-field mutation probability.
    pub prob_mut: f64,
    /// Standard deviation of the threshold perturbation.
    pub std_dev_mut: f64,
}

/// Trajectory output cadence.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of generations between saved frames.
    pub gens_per_save: usize,
    /// Number of frames written per trajectory file.
    pub saves_per_file: usize,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn n_players(&self, class: Class) -> usize {
        match class {
            Class::Rich => self.init.n_rich,
            Class::Poor => self.init.n_poor,
        }
    }

    pub fn wealth(&self, class: Class) -> f64 {
        match class {
            Class::Rich => self.init.wealth_rich,
            Class::Poor => self.init.wealth_poor,
        }
    }

    pub fn alpha(&self, class: Class) -> f64 {
        match class {
            Class::Rich => self.model.alpha_rich,
            Class::Poor => self.model.alpha_poor,
        }
    }

    fn validate(&self) -> Result<()> {
        check_num(self.model.n_rounds, 1..1_000).context("invalid number of rounds")?;
        check_num(self.model.lambda, 0.0..1_000.0).context("invalid risk sensitivity")?;
        check_num(self.model.alpha_rich, 0.0..=1.0).context("invalid rich loss fraction")?;
        check_num(self.model.alpha_poor, 0.0..=1.0).context("invalid poor loss fraction")?;

        check_num(self.init.n_rich, 1..100_000).context("invalid number of rich players")?;
        check_num(self.init.n_poor, 1..100_000).context("invalid number of poor players")?;
        // Wealth endowments bound the payoffs, which pass through `exp` on
        // their way to selection weights.
        check_num(self.init.wealth_rich, 0.0..100.0).context("invalid rich wealth endowment")?;
        check_num(self.init.wealth_poor, 0.0..100.0).context("invalid poor wealth endowment")?;

        check_num(self.evolution.n_games, 1..1_000_000).context("invalid number of games")?;
        check_num(self.evolution.prob_mut, 0.0..=1.0).context("invalid mutation probability")?;
        check_num(self.evolution.std_dev_mut, 0.0..10.0)
            .context("invalid mutation standard deviation")?;

        check_num(self.output.gens_per_save, 1..10_000)
            .context("invalid number of generations per save")?;
        check_num(self.output.saves_per_file, 1..10_000)
            .context("invalid number of saves per file")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
pub fn sample_config() -> Config {
    Config {
        model: ModelConfig {
            n_rounds: 4,
            lambda: 10.0,
            risk_curve: RiskCurve::Logistic,
            risk_rounds: RiskRounds::Every,
            alpha_rich: 0.5,
            alpha_poor: 1.0,
            smoothed_payoff: true,
        },
        init: InitConfig {
            n_rich: 10,
            n_poor: 10,
            wealth_rich: 4.0,
            wealth_poor: 1.0,
            seed: Some(1234),
        },
        evolution: EvolutionConfig {
            n_games: 300,
            prob_mut: 0.03,
            std_dev_mut: 0.15,
        },
        output: OutputConfig {
            gens_per_save: 2,
            saves_per_file: 4,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[model]
n_rounds = 4
lambda = 10.0
risk_curve = "logistic"
risk_rounds = "random"
alpha_rich = 0.5
alpha_poor = 1.0
smoothed_payoff = true

[init]
n_rich = 10
n_poor = 10
wealth_rich = 4.0
wealth_poor = 1.0
seed = 1234

[evolution]
n_games = 300
prob_mut = 0.03
std_dev_mut = 0.15

[output]
gens_per_save = 10
saves_per_file = 50
"#;

    #[test]
    fn sample_toml_parses_and_validates() {
        let cfg: Config = toml::from_str(SAMPLE_TOML).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.model.risk_rounds, RiskRounds::Random);
        assert_eq!(cfg.init.seed, Some(1234));
    }

    #[test]
    fn seed_is_optional() {
        let cfg: Config = toml::from_str(&SAMPLE_TOML.replace("seed = 1234\n", "")).unwrap();
        assert_eq!(cfg.init.seed, None);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad = [
            ("n_rounds = 4", "n_rounds = 0"),
            ("n_games = 300", "n_games = 0"),
            ("n_rich = 10", "n_rich = 0"),
            ("prob_mut = 0.03", "prob_mut = -0.1"),
            ("std_dev_mut = 0.15", "std_dev_mut = -1.0"),
            ("alpha_poor = 1.0", "alpha_poor = 1.5"),
            ("wealth_rich = 4.0", "wealth_rich = 500.0"),
        ];
        for (from, to) in bad {
            let cfg: Config = toml::from_str(&SAMPLE_TOML.replace(from, to)).unwrap();
            assert!(cfg.validate().is_err(), "accepted {to}");
        }
    }

    #[test]
    fn unknown_risk_round_kind_is_rejected() {
        let toml_str = SAMPLE_TOML.replace("risk_rounds = \"random\"", "risk_rounds = \"sometimes\"");
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }
}
