use serde::{Deserialize, Serialize};

/// Running mean and variance of a stream of values (Welford's method).
pub struct Accumulator {
    n: usize,
    mean: f64,
    m2: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.n += 1;
        let delta = val - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (val - self.mean);
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: self.mean,
            std_dev: if self.n > 1 {
                (self.m2 / (self.n - 1) as f64).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// A time series whose stationary part is found before summarizing.
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    pub is_equil: bool,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let i_equil = equilibration_index(&self.vals);
        let tail = &self.vals[i_equil..];
        TimeSeriesReport {
            mean: mean(tail),
            std_dev: variance(tail).sqrt(),
            sem: blocking_sem(tail),
            is_equil: i_equil != self.vals.len() / 2,
        }
    }
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn variance(vals: &[f64]) -> f64 {
    let n = vals.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Standard error of the mean by the Flyvbjerg-Petersen blocking method.
///
/// The series is repeatedly block-averaged in pairs; the first blocking level
/// whose SEM estimate rises above the lower error bounds of all coarser
/// levels is taken as converged.
fn blocking_sem(vals: &[f64]) -> f64 {
    let mut blocked = vals.to_vec();
    let mut levels = Vec::new();

    while blocked.len() >= 2 {
        let n = blocked.len() as f64;
        let sem2 = variance(&blocked) / n;
        levels.push((sem2, sem2 * (2.0 / (n - 1.0)).sqrt()));

        blocked = blocked
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
    }

    for (idx, &(sem2, _)) in levels.iter().enumerate() {
        let max_low = levels[idx..]
            .iter()
            .map(|&(est, err)| est - err)
            .fold(f64::NEG_INFINITY, f64::max);
        if sem2 > max_low {
            return sem2.sqrt();
        }
    }

    levels.last().map_or(f64::NAN, |&(sem2, _)| sem2.sqrt())
}

/// Index of the first stationary value by the marginal standard error rule.
///
/// Candidate truncation points halve from the midpoint down to zero; the one
/// minimizing `var * (n - 1) / n^2` over the remaining tail wins.
fn equilibration_index(vals: &[f64]) -> usize {
    if vals.len() < 2 {
        return 0;
    }

    let mut candidates = Vec::new();
    let mut cand = vals.len() / 2;
    while cand > 0 {
        candidates.push(cand);
        cand /= 2;
    }
    candidates.push(0);
    candidates.reverse();

    let mut opt_i_equil = vals.len() / 2;
    let mut min_mse = f64::INFINITY;
    for i_equil in candidates {
        let tail = &vals[i_equil..];
        let n = tail.len();
        let mse = variance(tail) * (n - 1) as f64 / n.pow(2) as f64;
        if mse < min_mse {
            min_mse = mse;
            opt_i_equil = i_equil;
        }
    }

    opt_i_equil
}
