use crate::config::Config;
use crate::model::{Class, State};
use crate::stats::{Accumulator, TimeSeries};
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, state: &State) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Average realized contribution at each round, per wealth class.
pub struct AvgContrib {
    rich: Vec<Accumulator>,
    poor: Vec<Accumulator>,
}

impl AvgContrib {
    pub fn new(cfg: &Config) -> Self {
        let mut rich = Vec::new();
        rich.resize_with(cfg.model.n_rounds, Accumulator::new);
        let mut poor = Vec::new();
        poor.resize_with(cfg.model.n_rounds, Accumulator::new);
        Self { rich, poor }
    }

    fn accs_mut(&mut self, class: Class) -> &mut [Accumulator] {
        match class {
            Class::Rich => &mut self.rich,
            Class::Poor => &mut self.poor,
        }
    }
}

impl Obs for AvgContrib {
    fn update(&mut self, state: &State) -> Result<()> {
        for class in Class::ALL {
            let contrib = state.stats.contrib(class);
            for (acc, &val) in self.accs_mut(class).iter_mut().zip(contrib) {
                acc.add(val);
            }
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let rich: Vec<_> = self.rich.iter().map(|acc| acc.report()).collect();
        let poor: Vec<_> = self.poor.iter().map(|acc| acc.report()).collect();
        serde_json::json!({ "avg_contrib": { "rich": rich, "poor": poor } })
    }
}

/// Class mean payoff over the saved generations, with equilibration
/// detection and a blocking error estimate.
pub struct MeanPayoff {
    rich: TimeSeries,
    poor: TimeSeries,
}

impl MeanPayoff {
    pub fn new() -> Self {
        Self {
            rich: TimeSeries::new(),
            poor: TimeSeries::new(),
        }
    }
}

impl Obs for MeanPayoff {
    fn update(&mut self, state: &State) -> Result<()> {
        self.rich.push(state.stats.mean_payoff(Class::Rich));
        self.poor.push(state.stats.mean_payoff(Class::Poor));
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "mean_payoff": {
            "rich": self.rich.report(),
            "poor": self.poor.report(),
        } })
    }
}

/// Population mean of each playbook field at each round, per wealth class.
pub struct AvgStrategy {
    rich: Vec<RuleAccs>,
    poor: Vec<RuleAccs>,
}

struct RuleAccs {
    tau: Accumulator,
    a: Accumulator,
    b: Accumulator,
}

impl RuleAccs {
    fn new() -> Self {
        Self {
            tau: Accumulator::new(),
            a: Accumulator::new(),
            b: Accumulator::new(),
        }
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "tau": self.tau.report(),
            "a": self.a.report(),
            "b": self.b.report(),
        })
    }
}

impl AvgStrategy {
    pub fn new(cfg: &Config) -> Self {
        let mut rich = Vec::new();
        rich.resize_with(cfg.model.n_rounds, RuleAccs::new);
        let mut poor = Vec::new();
        poor.resize_with(cfg.model.n_rounds, RuleAccs::new);
        Self { rich, poor }
    }

    fn accs_mut(&mut self, class: Class) -> &mut [RuleAccs] {
        match class {
            Class::Rich => &mut self.rich,
            Class::Poor => &mut self.poor,
        }
    }
}

impl Obs for AvgStrategy {
    fn update(&mut self, state: &State) -> Result<()> {
        for class in Class::ALL {
            let strategies = state.population.strategies(class);
            let n_players = strategies.len() as f64;

            for (round, accs) in self.accs_mut(class).iter_mut().enumerate() {
                let mut tau_sum = 0.0;
                let mut a_sum = 0.0;
                let mut b_sum = 0.0;
                for strategy in strategies {
                    tau_sum += strategy[round].tau;
                    a_sum += strategy[round].a;
                    b_sum += strategy[round].b;
                }
                accs.tau.add(tau_sum / n_players);
                accs.a.add(a_sum / n_players);
                accs.b.add(b_sum / n_players);
            }
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let rich: Vec<_> = self.rich.iter().map(|accs| accs.report()).collect();
        let poor: Vec<_> = self.poor.iter().map(|accs| accs.report()).collect();
        serde_json::json!({ "avg_strategy": { "rich": rich, "poor": poor } })
    }
}

pub struct Analyzer {
    cfg: Config,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: Config) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        obs_ptr_vec.push(Box::new(AvgContrib::new(&cfg)));
        obs_ptr_vec.push(Box::new(MeanPayoff::new()));
        obs_ptr_vec.push(Box::new(AvgStrategy::new(&cfg)));
        Self { cfg, obs_ptr_vec }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {:?}", file))?;
        let mut reader = BufReader::new(file);

        for _ in 0..self.cfg.output.saves_per_file {
            let state = decode::from_read(&mut reader).context("failed to read state")?;
            for obs in &mut self.obs_ptr_vec {
                obs.update(&state).context("failed to update observable")?;
            }
        }
        Ok(())
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {:?}", file))?;
        let writer = BufWriter::new(file);

        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::to_writer_pretty(writer, &reports)?;
        Ok(())
    }
}
