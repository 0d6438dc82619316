use crate::config::Config;
use crate::game::{self, MatchPlayer};
use crate::model::{Class, GenStats, Population, RoundRule, State, Strategy};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Bernoulli, Normal, weighted::WeightedIndex};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration, current state, and random number generator,
/// and provides methods to initialize, run, save, and load simulations.
/// One generation is a tournament of pairwise matches over a frozen
/// population, followed by fitness-proportional selection and mutation.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    state: State,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with a randomly drawn strategy population.
    ///
    /// With a configured seed the RNG is put on `stream`, giving every run
    /// of the same simulation its own reproducible random stream; without
    /// one it is seeded from the OS.
    pub fn generate_initial_condition(cfg: Config, stream: u64) -> Result<Self> {
        let mut rng = match cfg.init.seed {
            Some(seed) => {
                let mut rng = ChaCha12Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                rng
            }
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let rich = draw_strategies(&cfg, Class::Rich, &mut rng);
        let poor = draw_strategies(&cfg, Class::Poor, &mut rng);

        let state = State {
            generation: 0,
            population: Population::new(rich, poor),
            stats: GenStats::zeroed(cfg.model.n_rounds),
        };

        Ok(Self { cfg, state, rng })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Advance the simulation and save the visited states to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        for i_save in 0..self.cfg.output.saves_per_file {
            for _ in 0..self.cfg.output.gens_per_save {
                self.perform_generation()
                    .context("failed to perform generation")?;
            }

            encode::write(&mut writer, &self.state).context("failed to serialize state")?;

            let progress = 100.0 * (i_save + 1) as f64 / self.cfg.output.saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later: the RNG is stored with
    /// the state, so a restored engine continues the same random stream.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    fn perform_generation(&mut self) -> Result<()> {
        // Evaluate the frozen population with a tournament of matches.
        let (fitness_rich, fitness_poor, stats) = self
            .run_tournament()
            .context("failed to run tournament")?;

        // Resample strategies in proportion to fitness.
        self.select_strategies(Class::Rich, &fitness_rich)
            .context("failed to select rich strategies")?;
        self.select_strategies(Class::Poor, &fitness_poor)
            .context("failed to select poor strategies")?;

        // Perturb the survivors.
        self.mutate_strategies()
            .context("failed to mutate strategies")?;

        self.state.stats = stats;
        self.state.generation += 1;

        Ok(())
    }

    fn run_tournament(&mut self) -> Result<(Vec<f64>, Vec<f64>, GenStats)> {
        let n_rich = self.cfg.init.n_rich;
        let n_total = n_rich + self.cfg.init.n_poor;

        let mut tally_rich = ClassTally::new(n_rich, self.cfg.model.n_rounds);
        let mut tally_poor = ClassTally::new(self.cfg.init.n_poor, self.cfg.model.n_rounds);

        for _ in 0..self.cfg.evolution.n_games {
            // Two distinct player slots from the combined pool.
            let pair = index::sample(&mut self.rng, n_total, 2);
            let (class_a, i_a) = split_index(pair.index(0), n_rich);
            let (class_b, i_b) = split_index(pair.index(1), n_rich);

            let population = &self.state.population;
            let player_a = MatchPlayer {
                wealth: self.cfg.wealth(class_a),
                alpha: self.cfg.alpha(class_a),
                strategy: &population.strategies(class_a)[i_a],
            };
            let player_b = MatchPlayer {
                wealth: self.cfg.wealth(class_b),
                alpha: self.cfg.alpha(class_b),
                strategy: &population.strategies(class_b)[i_b],
            };

            let outcome = game::play_match(&self.cfg.model, &player_a, &player_b, &mut self.rng)
                .context("failed to play match")?;

            tally_for(class_a, &mut tally_rich, &mut tally_poor).record(
                i_a,
                outcome.payoff_a,
                &outcome.contrib_a,
            );
            tally_for(class_b, &mut tally_rich, &mut tally_poor).record(
                i_b,
                outcome.payoff_b,
                &outcome.contrib_b,
            );
        }

        let stats = GenStats {
            contrib_rich: tally_rich.mean_contrib(),
            contrib_poor: tally_poor.mean_contrib(),
            mean_payoff_rich: tally_rich.mean_payoff(),
            mean_payoff_poor: tally_poor.mean_payoff(),
        };

        Ok((tally_rich.fitness(), tally_poor.fitness(), stats))
    }

    fn select_strategies(&mut self, class: Class, fitness: &[f64]) -> Result<()> {
        let select_dist = WeightedIndex::new(fitness)?;

        let strategies = self.state.population.strategies(class);
        // Gathered strategies are cloned, so duplicated lineages mutate
        // independently afterwards.
        let selected: Vec<Strategy> = (0..strategies.len())
            .map(|_| strategies[select_dist.sample(&mut self.rng)].clone())
            .collect();

        *self.state.population.strategies_mut(class) = selected;
        Ok(())
    }

    fn mutate_strategies(&mut self) -> Result<()> {
        let mut_dist = Bernoulli::new(self.cfg.evolution.prob_mut)?;
        let tau_noise_dist = Normal::new(0.0, self.cfg.evolution.std_dev_mut)?;

        for class in Class::ALL {
            let wealth = self.cfg.wealth(class);
            for strategy in self.state.population.strategies_mut(class) {
                for rule in strategy {
                    if mut_dist.sample(&mut self.rng) {
                        let noise = tau_noise_dist.sample(&mut self.rng);
                        rule.tau = (rule.tau + noise).clamp(0.0, 1.0);
                    }
                    if mut_dist.sample(&mut self.rng) {
                        rule.a = self.rng.random::<f64>() * wealth;
                    }
                    if mut_dist.sample(&mut self.rng) {
                        rule.b = self.rng.random::<f64>() * wealth;
                    }
                }
            }
        }

        Ok(())
    }
}

fn draw_strategies(cfg: &Config, class: Class, rng: &mut ChaCha12Rng) -> Vec<Strategy> {
    let wealth = cfg.wealth(class);
    (0..cfg.n_players(class))
        .map(|_| {
            (0..cfg.model.n_rounds)
                .map(|_| RoundRule {
                    tau: rng.random(),
                    a: rng.random::<f64>() * wealth,
                    b: rng.random::<f64>() * wealth,
                })
                .collect()
        })
        .collect()
}

/// Map a combined-pool index to a wealth class and the index within it.
fn split_index(idx: usize, n_rich: usize) -> (Class, usize) {
    if idx < n_rich {
        (Class::Rich, idx)
    } else {
        (Class::Poor, idx - n_rich)
    }
}

fn tally_for<'a>(
    class: Class,
    rich: &'a mut ClassTally,
    poor: &'a mut ClassTally,
) -> &'a mut ClassTally {
    match class {
        Class::Rich => rich,
        Class::Poor => poor,
    }
}

/// Accumulated tournament results of one wealth class.
struct ClassTally {
    payoff: Vec<f64>,
    matches: Vec<usize>,
    contrib: Vec<f64>,
    taken: usize,
}

impl ClassTally {
    fn new(n_players: usize, n_rounds: usize) -> Self {
        Self {
            payoff: vec![0.0; n_players],
            matches: vec![0; n_players],
            contrib: vec![0.0; n_rounds],
            taken: 0,
        }
    }

    fn record(&mut self, player: usize, payoff: f64, contrib: &[f64]) {
        self.payoff[player] += payoff;
        self.matches[player] += 1;
        for (sum, val) in self.contrib.iter_mut().zip(contrib) {
            *sum += val;
        }
        self.taken += 1;
    }

    fn avg_payoff(&self, player: usize) -> f64 {
        self.payoff[player] / self.matches[player].max(1) as f64
    }

    /// Reproduction weights; a player never sampled scores a neutral
    /// `exp(0) = 1`.
    fn fitness(&self) -> Vec<f64> {
        (0..self.payoff.len())
            .map(|player| self.avg_payoff(player).exp())
            .collect()
    }

    fn mean_payoff(&self) -> f64 {
        let n_players = self.payoff.len();
        (0..n_players).map(|player| self.avg_payoff(player)).sum::<f64>() / n_players as f64
    }

    fn mean_contrib(&self) -> Vec<f64> {
        self.contrib
            .iter()
            .map(|sum| sum / self.taken.max(1) as f64)
            .collect()
    }
}
