use crate::config::ModelConfig;
use crate::model::{RoundRule, Strategy};
use crate::risk::RiskRounds;
use anyhow::Result;
use rand::Rng;

/// One side of a pairwise match.
#[derive(Debug)]
pub struct MatchPlayer<'a> {
    /// Wealth endowment at the start of the match.
    pub wealth: f64,
    /// Fraction of current wealth destroyed when a catastrophe fires.
    pub alpha: f64,
    pub strategy: &'a Strategy,
}

/// Outcome of one pairwise match.
#[derive(Debug)]
pub struct MatchOutcome {
    pub payoff_a: f64,
    pub payoff_b: f64,

    /// Realized contribution of each player at each round; zero where a gift
    /// was rejected or the strategy offered nothing.
    pub contrib_a: Vec<f64>,
    pub contrib_b: Vec<f64>,
}

/// Threshold-triggered contribution policy.
///
/// Offers `a` while the common pool is at or below `tau` times the pair's
/// total initial wealth, `b` once it has grown past that.
pub fn participation(pool: f64, rule: &RoundRule, total_wealth: f64) -> f64 {
    if pool <= rule.tau * total_wealth {
        rule.a
    } else {
        rule.b
    }
}

/// Simulate one repeated game between two players over `n_rounds` rounds.
///
/// Each round both players evaluate their policy against the pool as observed
/// at the start of the round, so neither sees the other's current gift. A gift
/// exceeding the player's remaining wealth is rejected whole: the trace
/// records zero and neither wealth nor pool change. On gated rounds a single
/// loss probability is drawn from the risk curve and one coin flip decides the
/// catastrophe for both players at once.
pub fn play_match<R: Rng>(
    model: &ModelConfig,
    a: &MatchPlayer,
    b: &MatchPlayer,
    rng: &mut R,
) -> Result<MatchOutcome> {
    let total = a.wealth + b.wealth;

    let mut wealth_a = a.wealth;
    let mut wealth_b = b.wealth;
    let mut payoff_a = a.wealth;
    let mut payoff_b = b.wealth;

    let mut pool = 0.0;
    let mut contrib_a = vec![0.0; model.n_rounds];
    let mut contrib_b = vec![0.0; model.n_rounds];

    let drawn = match model.risk_rounds {
        RiskRounds::Random => Some(rng.random_range(0..model.n_rounds)),
        _ => None,
    };

    for round in 0..model.n_rounds {
        let gift_a = participation(pool, &a.strategy[round], total);
        let gift_b = participation(pool, &b.strategy[round], total);

        let paid_a = if gift_a <= wealth_a { gift_a } else { 0.0 };
        let paid_b = if gift_b <= wealth_b { gift_b } else { 0.0 };
        contrib_a[round] = paid_a;
        contrib_b[round] = paid_b;
        wealth_a -= paid_a;
        wealth_b -= paid_b;
        pool += paid_a + paid_b;

        let mut prob = 0.0;
        let mut fired = false;
        if model.risk_rounds.selects(round, model.n_rounds, drawn) {
            prob = model
                .risk_curve
                .loss_probability(pool, total, model.lambda)?;
            // The flip is drawn under both payoff rules so that a given seed
            // produces the same event sequence regardless of the toggle.
            fired = rng.random::<f64>() <= prob;
        }
        if fired {
            wealth_a -= a.alpha * wealth_a;
            wealth_b -= b.alpha * wealth_b;
        }

        if model.smoothed_payoff {
            payoff_a = (1.0 - a.alpha * prob) * (payoff_a - paid_a);
            payoff_b = (1.0 - b.alpha * prob) * (payoff_b - paid_b);
        } else {
            payoff_a -= paid_a;
            payoff_b -= paid_b;
            if fired {
                payoff_a *= 1.0 - a.alpha;
                payoff_b *= 1.0 - b.alpha;
            }
        }
    }

    Ok(MatchOutcome {
        payoff_a,
        payoff_b,
        contrib_a,
        contrib_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sample_config;
    use crate::risk::RiskCurve;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn flat_strategy(n_rounds: usize, tau: f64, a: f64, b: f64) -> Strategy {
        vec![RoundRule { tau, a, b }; n_rounds]
    }

    fn logistic_floor(lambda: f64) -> f64 {
        // Loss probability of the logistic curve over an empty pool.
        1.0 / (1.0 + (-lambda / 2.0).exp())
    }

    #[test]
    fn participation_switches_at_the_threshold() {
        let rule = RoundRule {
            tau: 0.5,
            a: 2.0,
            b: 1.0,
        };
        assert_eq!(participation(0.0, &rule, 4.0), 2.0);
        assert_eq!(participation(2.0, &rule, 4.0), 2.0);
        assert_eq!(participation(2.0 + 1e-9, &rule, 4.0), 1.0);
    }

    #[test]
    fn zero_contributions_give_the_closed_form_payoff() {
        let mut model = sample_config().model;
        model.smoothed_payoff = true;
        let strat_a = flat_strategy(model.n_rounds, 1.0, 0.0, 0.0);
        let strat_b = flat_strategy(model.n_rounds, 1.0, 0.0, 0.0);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy: &strat_a,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat_b,
        };

        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let outcome = play_match(&model, &a, &b, &mut rng).unwrap();

        assert!(outcome.contrib_a.iter().all(|&c| c == 0.0));
        assert!(outcome.contrib_b.iter().all(|&c| c == 0.0));

        // The pool never grows, so every round is discounted by the same
        // empty-pool probability.
        let prob = logistic_floor(model.lambda);
        let expected_a = (0..model.n_rounds).fold(4.0, |acc, _| acc * (1.0 - 0.5 * prob));
        let expected_b = (0..model.n_rounds).fold(1.0, |acc, _| acc * (1.0 - 1.0 * prob));
        assert_eq!(outcome.payoff_a, expected_a);
        assert_eq!(outcome.payoff_b, expected_b);
    }

    #[test]
    fn oversized_gifts_are_rejected_whole() {
        let mut model = sample_config().model;
        model.n_rounds = 3;
        // A offers far more than it owns every round, B offers nothing.
        let strat_a = flat_strategy(3, 1.0, 100.0, 100.0);
        let strat_b = flat_strategy(3, 1.0, 0.0, 0.0);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy: &strat_a,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat_b,
        };

        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let outcome = play_match(&model, &a, &b, &mut rng).unwrap();

        assert_eq!(outcome.contrib_a, vec![0.0; 3]);
        // With the pool stuck at zero the payoff matches the
        // zero-contribution closed form, so the rejection left no trace on
        // the pool either.
        let prob = logistic_floor(model.lambda);
        let expected = (0..3).fold(4.0, |acc, _| acc * (1.0 - 0.5 * prob));
        assert_eq!(outcome.payoff_a, expected);
    }

    #[test]
    fn an_all_in_gift_drains_wealth_once() {
        let mut model = sample_config().model;
        model.n_rounds = 2;
        // Contribute the whole endowment; the second attempt exceeds the
        // remaining wealth of zero and must be rejected.
        let strat_a = flat_strategy(2, 1.0, 4.0, 4.0);
        let strat_b = flat_strategy(2, 1.0, 0.0, 0.0);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.0,
            strategy: &strat_a,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 0.0,
            strategy: &strat_b,
        };

        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let outcome = play_match(&model, &a, &b, &mut rng).unwrap();

        assert_eq!(outcome.contrib_a, vec![4.0, 0.0]);
        let total: f64 = outcome.contrib_a.iter().sum();
        assert!(total <= 4.0);
    }

    #[test]
    fn first_and_last_gating_see_different_pools() {
        let mut model = sample_config().model;
        model.n_rounds = 2;
        // A pays 1 per round into a pair worth 5, so the pool is 1 after
        // round 0 and 2 after round 1. A keeps affording the second gift
        // whether or not the catastrophe fires (alpha 0.5 leaves at least
        // 1.5 of wealth), so the smoothed payoff is seed-independent.
        let strat_a = flat_strategy(2, 1.0, 1.0, 1.0);
        let strat_b = flat_strategy(2, 1.0, 0.0, 0.0);
        let player_a = |strategy| MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy,
        };
        let player_b = |strategy| MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy,
        };

        let prob_at = |pool: f64| {
            RiskCurve::Logistic
                .loss_probability(pool, 5.0, model.lambda)
                .unwrap()
        };

        model.risk_rounds = RiskRounds::First;
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let outcome = play_match(&model, &player_a(&strat_a), &player_b(&strat_b), &mut rng).unwrap();
        let expected = (1.0 - 0.5 * prob_at(1.0)) * (4.0 - 1.0) - 1.0;
        assert_eq!(outcome.payoff_a, expected);

        model.risk_rounds = RiskRounds::Last;
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let outcome = play_match(&model, &player_a(&strat_a), &player_b(&strat_b), &mut rng).unwrap();
        let expected = (1.0 - 0.5 * prob_at(2.0)) * ((4.0 - 1.0) - 1.0);
        assert_eq!(outcome.payoff_a, expected);
    }

    #[test]
    fn random_gating_checks_exactly_one_round() {
        let mut model = sample_config().model;
        model.risk_rounds = RiskRounds::Random;
        let strat = flat_strategy(model.n_rounds, 1.0, 0.0, 0.0);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy: &strat,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat,
        };

        // With zero contributions the payoff picks up exactly one discount
        // factor, no matter which round was drawn.
        let prob = logistic_floor(model.lambda);
        for seed in 0..32 {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let outcome = play_match(&model, &a, &b, &mut rng).unwrap();
            assert_eq!(outcome.payoff_a, 4.0 * (1.0 - 0.5 * prob));
            assert_eq!(outcome.payoff_b, 1.0 * (1.0 - 1.0 * prob));
        }
    }

    #[test]
    fn same_seed_reproduces_a_match() {
        let mut model = sample_config().model;
        // Random gating makes the reproduced quantities include the drawn
        // round index, not just the coin flips.
        model.risk_rounds = RiskRounds::Random;
        let strat_a = flat_strategy(model.n_rounds, 0.4, 1.5, 0.5);
        let strat_b = flat_strategy(model.n_rounds, 0.6, 0.8, 0.2);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy: &strat_a,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat_b,
        };

        let mut rng = ChaCha12Rng::seed_from_u64(99);
        let first = play_match(&model, &a, &b, &mut rng).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(99);
        let second = play_match(&model, &a, &b, &mut rng).unwrap();

        assert_eq!(first.payoff_a, second.payoff_a);
        assert_eq!(first.payoff_b, second.payoff_b);
        assert_eq!(first.contrib_a, second.contrib_a);
        assert_eq!(first.contrib_b, second.contrib_b);
    }

    #[test]
    fn realized_payoff_is_all_or_nothing_for_total_loss() {
        let mut model = sample_config().model;
        model.risk_rounds = RiskRounds::First;
        model.lambda = 0.0; // logistic at lambda 0 flips a fair coin
        model.smoothed_payoff = false;
        let strat = flat_strategy(model.n_rounds, 1.0, 0.0, 0.0);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 1.0,
            strategy: &strat,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat,
        };

        let mut ruined = 0;
        for seed in 0..100 {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let outcome = play_match(&model, &a, &b, &mut rng).unwrap();
            assert!(outcome.payoff_a == 0.0 || outcome.payoff_a == 4.0);
            if outcome.payoff_a == 0.0 {
                ruined += 1;
            }
        }
        // A fair coin over 100 seeds ruins roughly half of the matches.
        assert!((10..=90).contains(&ruined), "ruined {ruined} of 100");
    }

    #[test]
    fn payoff_toggle_does_not_change_the_event_stream() {
        let mut model = sample_config().model;
        let strat_a = flat_strategy(model.n_rounds, 0.4, 1.5, 0.5);
        let strat_b = flat_strategy(model.n_rounds, 0.6, 0.8, 0.2);
        let a = MatchPlayer {
            wealth: 4.0,
            alpha: 0.5,
            strategy: &strat_a,
        };
        let b = MatchPlayer {
            wealth: 1.0,
            alpha: 1.0,
            strategy: &strat_b,
        };

        model.smoothed_payoff = true;
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let smoothed = play_match(&model, &a, &b, &mut rng).unwrap();

        model.smoothed_payoff = false;
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let realized = play_match(&model, &a, &b, &mut rng).unwrap();

        assert_eq!(smoothed.contrib_a, realized.contrib_a);
        assert_eq!(smoothed.contrib_b, realized.contrib_b);
    }
}
