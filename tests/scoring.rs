use chrono::{TimeZone, Utc};

use matchday_signals::calibration::CalibrationFactors;
use matchday_signals::competition::LeagueTier;
use matchday_signals::context::{FixtureContext, FixtureInputs, XgEstimate};
use matchday_signals::fixture::{Competition, Fixture, MatchStatus, Odds, Score, Side, Team};
use matchday_signals::form::{HeadToHead, TeamForm, head_to_head_score};
use matchday_signals::probs::{NEUTRAL_1X2, normalize_implied_probs, poisson_over};
use matchday_signals::evaluate::evaluate;
use matchday_signals::scorer::{ScoringConfig, compute_signals, over_1_5_probability};
use matchday_signals::signal::{BetType, Pick, Signal};

fn fixture(competition: &str) -> Fixture {
    Fixture {
        id: 42,
        competition: Competition {
            id: 39,
            name: competition.to_string(),
            country: "England".to_string(),
            season: 2025,
        },
        kickoff: Utc.with_ymd_and_hms(2025, 10, 18, 14, 0, 0).unwrap(),
        home: Team {
            id: 1,
            name: "Arsenal".to_string(),
            country: Some("England".to_string()),
            domestic_competition_id: Some(39),
        },
        away: Team {
            id: 2,
            name: "Fulham".to_string(),
            country: Some("England".to_string()),
            domestic_competition_id: Some(39),
        },
        status: MatchStatus::NotStarted,
        score: None,
    }
}

fn form(wins: usize, matches: usize, goals_for: f64, goals_against: f64) -> TeamForm {
    TeamForm {
        matches,
        wins,
        draws: 0,
        losses: matches - wins,
        goals_for,
        goals_against,
        xg_for: goals_for,
        xg_against: goals_against,
    }
}

fn xg(xg_for: f64) -> Option<XgEstimate> {
    Some(XgEstimate {
        xg_for,
        xg_against: 1.0,
    })
}

#[test]
fn implied_probs_sum_to_one_over_a_price_grid() {
    let prices = [1.01, 1.2, 1.5, 1.9, 2.5, 3.4, 5.0, 8.0, 15.0, 41.0];
    for h in prices {
        for d in prices {
            for a in prices {
                let (ph, pd, pa) = normalize_implied_probs(Some(h), Some(d), Some(a));
                assert!((ph + pd + pa - 1.0).abs() < 1e-9);
                for p in [ph, pd, pa] {
                    assert!(p > 0.0 && p < 1.0);
                }
            }
        }
    }
}

#[test]
fn unusable_prices_give_the_neutral_triple() {
    let cases = [
        (Some(0.0), Some(3.0), Some(3.0)),
        (Some(-2.0), Some(3.0), Some(3.0)),
        (Some(1.0), Some(3.0), Some(3.0)),
        (None, Some(3.0), Some(3.0)),
        (Some(2.0), None, None),
        (None, None, None),
    ];
    for (h, d, a) in cases {
        assert_eq!(normalize_implied_probs(h, d, a), NEUTRAL_1X2);
    }
}

#[test]
fn poisson_over_is_bounded_and_monotone_in_lambda() {
    for line in [0.0, 0.5, 1.5, 2.5, 4.5] {
        let mut prev = 0.0;
        for step in 0..=80 {
            let lambda = step as f64 * 0.1;
            let p = poisson_over(lambda, line);
            assert!((0.0..=1.0).contains(&p));
            assert!(p + 1e-12 >= prev, "lambda={lambda} line={line}");
            prev = p;
        }
    }
}

#[test]
fn empty_form_resolves_to_neutral_averages() {
    let f = TeamForm::empty();
    assert_eq!(f.matches, 0);
    assert!((f.goals_for - 1.2).abs() < 1e-12);
    assert!((f.goals_against - 1.1).abs() < 1e-12);
    assert_eq!(f.win_rate(), None);
}

#[test]
fn head_to_head_score_branches() {
    // Small sample: plain mean of the four goal averages.
    let small = head_to_head_score(2, 100.0, 2.0, 1.0, 1.0, 2.0);
    assert!((small - 1.5).abs() < 1e-12);
    // Weighted branch from three meetings on.
    let weighted = head_to_head_score(3, 50.0, 1.0, 1.0, 1.0, 1.0);
    assert!((weighted - (0.3 + 0.4 + 0.4)).abs() < 1e-12);
    for s in [small, weighted] {
        assert!((0.0..=2.5).contains(&s));
    }
    assert_eq!(head_to_head_score(0, 0.0, 0.0, 0.0, 0.0, 0.0), 0.0);
}

#[test]
fn strong_home_favourite_fires_result_signal() {
    let mut inputs = FixtureInputs::bare(fixture("Premier League"));
    inputs.odds = Some(Odds {
        home: Some(1.80),
        draw: Some(3.40),
        away: Some(4.20),
        ..Odds::default()
    });
    inputs.home_form = Some(form(4, 5, 2.0, 0.8));
    inputs.away_form = Some(form(1, 5, 0.8, 1.6));
    inputs.home_xg = xg(1.8);
    inputs.away_xg = xg(0.9);

    let signals =
        compute_signals(&inputs, &CalibrationFactors::default(), &ScoringConfig::default())
            .unwrap();
    let result = signals
        .iter()
        .find(|s| s.bet_type() == BetType::Result)
        .expect("result signal");
    assert_eq!(result.pick, Pick::Win(Side::Home));
    assert!(result.confidence >= 0.70);
    assert!((result.confidence - 0.7718).abs() < 1e-3);
    assert_eq!(result.odd, Some(1.80));
    assert!(result.actionable);
}

#[test]
fn stingy_defences_never_produce_btts() {
    let attacking = [0.9, 1.5, 2.5, 3.5];
    let prices = [None, Some(1.2), Some(1.5)];
    for gf in attacking {
        for price in prices {
            let mut inputs = FixtureInputs::bare(fixture("Premier League"));
            inputs.odds = Some(Odds {
                btts_yes: price,
                ..Odds::default()
            });
            inputs.home_form = Some(form(3, 5, gf, 0.5));
            inputs.away_form = Some(form(3, 5, gf, 0.5));
            inputs.home_xg = xg(gf);
            inputs.away_xg = xg(gf);
            inputs.head_to_head = Some(HeadToHead {
                matches: 6,
                btts_pct: 100.0,
                score: 2.0,
                ..HeadToHead::empty()
            });
            let mut factors = CalibrationFactors::new();
            factors.set(BetType::Btts, 1.5);

            let signals = compute_signals(&inputs, &factors, &ScoringConfig::default()).unwrap();
            assert!(
                signals.iter().all(|s| s.bet_type() != BetType::Btts),
                "gf={gf} price={price:?}"
            );
        }
    }
}

#[test]
fn low_projected_goals_block_over_1_5() {
    let mut inputs = FixtureInputs::bare(fixture("Premier League"));
    inputs.odds = Some(Odds {
        over_1_5: Some(1.0 / 0.55),
        ..Odds::default()
    });
    inputs.home_form = Some(form(2, 5, 0.8, 0.7));
    inputs.away_form = Some(form(2, 5, 0.8, 0.7));
    inputs.home_xg = xg(0.8);
    inputs.away_xg = xg(0.7);

    let ctx = FixtureContext::resolve(&inputs).unwrap();
    assert!((ctx.xg_total() - 1.5).abs() < 1e-12);
    assert!((ctx.market.over_1_5 - 0.55).abs() < 1e-9);
    assert!(over_1_5_probability(&ctx) < 0.60);

    let signals =
        compute_signals(&inputs, &CalibrationFactors::default(), &ScoringConfig::default())
            .unwrap();
    assert!(signals.iter().all(|s| s.bet_type() != BetType::Over15));
}

#[test]
fn continental_tier_lowers_confidence_once() {
    let build = |tier: Option<LeagueTier>| {
        let mut inputs = FixtureInputs::bare(fixture("UEFA Champions League"));
        inputs.odds = Some(Odds {
            home: Some(1.80),
            draw: Some(3.40),
            away: Some(4.20),
            ..Odds::default()
        });
        inputs.home_form = Some(form(4, 5, 2.0, 0.8));
        inputs.away_form = Some(form(1, 5, 0.8, 1.6));
        inputs.home_xg = xg(1.8);
        inputs.away_xg = xg(0.9);
        inputs.tier = tier;
        let mut cfg = ScoringConfig::default();
        cfg.thresholds.result = 0.60;
        cfg.thresholds.result_margin = 0.0;
        compute_signals(&inputs, &CalibrationFactors::default(), &cfg).unwrap()
    };
    let elite = build(Some(LeagueTier::Elite));
    let semi = build(Some(LeagueTier::SemiElite));
    let conf = |sigs: &[Signal]| {
        sigs.iter()
            .find(|s| s.bet_type() == BetType::Result)
            .map(|s| s.confidence)
    };
    let elite_conf = conf(&elite).expect("elite fires");
    let semi_conf = conf(&semi).expect("semi-elite still fires");
    assert!((semi_conf - elite_conf * 0.95).abs() < 1e-9);
}

#[test]
fn calibration_factor_can_push_a_signal_under_threshold() {
    let mut inputs = FixtureInputs::bare(fixture("Premier League"));
    inputs.odds = Some(Odds {
        home: Some(1.80),
        draw: Some(3.40),
        away: Some(4.20),
        ..Odds::default()
    });
    inputs.home_form = Some(form(4, 5, 2.0, 0.8));
    inputs.away_form = Some(form(1, 5, 0.8, 1.6));
    inputs.home_xg = xg(1.8);
    inputs.away_xg = xg(0.9);

    let mut factors = CalibrationFactors::new();
    factors.set(BetType::Result, 0.9);
    let signals = compute_signals(&inputs, &factors, &ScoringConfig::default()).unwrap();
    assert!(signals.iter().all(|s| s.bet_type() != BetType::Result));
}

#[test]
fn evaluation_is_idempotent() {
    let score = Some(Score::new(2, 2));
    for pick in [
        Pick::Win(Side::Home),
        Pick::Win(Side::Away),
        Pick::Over15,
        Pick::BothTeamsScore,
        Pick::TeamScores(Side::Away),
    ] {
        assert_eq!(evaluate(pick, score), evaluate(pick, score));
    }
}
