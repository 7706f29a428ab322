use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationFactors;
use crate::context::{FixtureContext, FixtureInputs, SideContext};
use crate::error::ScoreError;
use crate::fixture::Side;
use crate::probs::poisson_over;
use crate::signal::{BetType, ConfidenceTier, OutcomeLabel, Pick, SOURCE_FUSION, Signal};

const CALIBRATED_MIN: f64 = 0.01;
const CALIBRATED_MAX: f64 = 0.99;

// Result (1X2)
const RESULT_MARKET_WEIGHT: f64 = 0.35;
const RESULT_FORM_WEIGHT: f64 = 0.65;
const RESULT_MAX_WITH_H2H: f64 = 0.97;
const H2H_WIN_BONUS_TIERS: [(f64, f64); 3] = [(0.80, 0.05), (0.70, 0.04), (0.60, 0.02)];

// Over 1.5
const OVER_MARKET_WEIGHT: f64 = 0.20;
const OVER_POISSON_WEIGHT: f64 = 0.40;
const OVER_GOALS_WEIGHT: f64 = 0.40;
const OVER_GOALS_SCALE: f64 = 2.2;
const OVER_MIN_LAMBDA_PER_SIDE: f64 = 0.15;
const OVER_MIN: f64 = 0.05;
const OVER_MAX: f64 = 0.98;
const OVER_XG_GATE: f64 = 2.0;

// BTTS
const BTTS_XG_SCALE: f64 = 1.7;
const BTTS_COMPOSITE_MIN: f64 = 0.30;
const BTTS_COMPOSITE_MAX: f64 = 0.95;
const BTTS_BLEND_MIN: f64 = 0.35;
const BTTS_BLEND_MAX: f64 = 0.97;
const BTTS_VETO_GOALS_AGAINST: f64 = 0.9;
const BTTS_MIN_GOALS_AGAINST: f64 = 1.0;
const BTTS_MIN_GOALS_FOR: f64 = 1.0;
const BTTS_MIN_XG_FOR: f64 = 1.10;
const BTTS_SYMMETRY_GAP: f64 = 0.25;
const BTTS_SYMMETRY_MIN_XG: f64 = 1.35;
const BTTS_SYMMETRY_BONUS: f64 = 0.01;
const BTTS_ASYMMETRY_GAP: f64 = 0.6;
const BTTS_ASYMMETRY_PENALTY: f64 = 0.10;
const BTTS_OPEN_GAME_XG: f64 = 1.35;
const BTTS_OPEN_GAME_LEAK: f64 = 0.75;
const BTTS_OPEN_GAME_CAP: f64 = 0.75;

// Team to score
const TEAM_MIN_GOALS_FOR: f64 = 0.9;
const TEAM_MIN_OPP_GOALS_AGAINST: f64 = 0.9;
const TEAM_MIN_XG_FOR: f64 = 1.0;
const TEAM_XG_SCALE: f64 = 1.6;
const TEAM_MAX: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub result: f64,
    /// Extra margin the Result signal must clear on top of `result`.
    pub result_margin: f64,
    pub over_1_5: f64,
    pub btts: f64,
    pub team_to_score: f64,
}

impl Thresholds {
    pub fn very_conservative() -> Self {
        Self {
            result: 0.85,
            result_margin: 0.0,
            over_1_5: 0.70,
            btts: 0.85,
            team_to_score: 0.70,
        }
    }

    pub fn for_type(&self, bet_type: BetType) -> f64 {
        match bet_type {
            BetType::Result => self.result + self.result_margin,
            BetType::Over15 => self.over_1_5,
            BetType::Btts => self.btts,
            BetType::TeamToScore => self.team_to_score,
        }
    }

    pub fn set(&mut self, bet_type: BetType, value: f64) {
        match bet_type {
            BetType::Result => self.result = value,
            BetType::Over15 => self.over_1_5 = value,
            BetType::Btts => self.btts = value,
            BetType::TeamToScore => self.team_to_score = value,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            result: 0.70,
            result_margin: 0.05,
            over_1_5: 0.60,
            btts: 0.70,
            team_to_score: 0.65,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub thresholds: Thresholds,
    pub very_conservative: Thresholds,
    /// Missing core estimators at which a fixture's signals become
    /// informational only.
    pub low_data_missing: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            very_conservative: Thresholds::very_conservative(),
            low_data_missing: 2,
        }
    }
}

pub fn calibrate(prob: f64, factor: f64) -> f64 {
    (prob * factor).clamp(CALIBRATED_MIN, CALIBRATED_MAX)
}

/// Favoured side and its raw probability, market blended with form and
/// boosted by a dominant head-to-head record.
pub fn result_estimate(ctx: &FixtureContext) -> (Side, f64) {
    let ph_raw = RESULT_MARKET_WEIGHT * ctx.market.home + RESULT_FORM_WEIGHT * ctx.home.win_rate;
    let pa_raw = RESULT_MARKET_WEIGHT * ctx.market.away + RESULT_FORM_WEIGHT * ctx.away.win_rate;
    let sum = ph_raw + pa_raw;
    let sum = if sum > 0.0 { sum } else { 1.0 };
    let (ph, pa) = (ph_raw / sum, pa_raw / sum);

    let (side, mut p) = if ph >= pa {
        (Side::Home, ph)
    } else {
        (Side::Away, pa)
    };

    let h2h_win = ctx.head_to_head.win_pct(side);
    if let Some((_, bonus)) = H2H_WIN_BONUS_TIERS
        .iter()
        .find(|(breakpoint, _)| h2h_win >= *breakpoint)
    {
        p = (p + bonus).min(RESULT_MAX_WITH_H2H);
    }
    (side, p)
}

pub fn over_1_5_probability(ctx: &FixtureContext) -> f64 {
    let lambda =
        ctx.home.xg_for.max(OVER_MIN_LAMBDA_PER_SIDE) + ctx.away.xg_for.max(OVER_MIN_LAMBDA_PER_SIDE);
    let p_poisson = poisson_over(lambda, 1.5);

    let gf_avg = (ctx.home.goals_for + ctx.away.goals_for) / 2.0;
    let ga_avg = (ctx.home.goals_against + ctx.away.goals_against) / 2.0;

    let mut p = OVER_MARKET_WEIGHT * ctx.market.over_1_5
        + OVER_POISSON_WEIGHT * p_poisson
        + OVER_GOALS_WEIGHT * ((gf_avg + ga_avg) / OVER_GOALS_SCALE);

    if ctx.home.goals_for > 1.4 && ctx.away.goals_for > 1.4 {
        p += 0.04;
    }
    if ctx.home.goals_against < 0.7 && ctx.away.goals_against < 0.7 {
        p -= 0.03;
    }
    let xg_total = ctx.xg_total();
    if xg_total > 2.3 {
        p += 0.03;
    } else if xg_total < 1.8 {
        p -= 0.04;
    }
    p.clamp(OVER_MIN, OVER_MAX)
}

/// Both sides leak fewer than 0.9 goals a match.
pub fn btts_vetoed(ctx: &FixtureContext) -> bool {
    ctx.home.goals_against < BTTS_VETO_GOALS_AGAINST
        && ctx.away.goals_against < BTTS_VETO_GOALS_AGAINST
}

/// Upper bound from the two defences, lifted for open games where both
/// attacks create chances and at least one side leaks.
fn btts_cap(home: &SideContext, away: &SideContext) -> f64 {
    let cap = btts_defense_cap(home.goals_against, away.goals_against);
    if home.xg_for >= BTTS_OPEN_GAME_XG
        && away.xg_for >= BTTS_OPEN_GAME_XG
        && (home.goals_against >= BTTS_OPEN_GAME_LEAK || away.goals_against >= BTTS_OPEN_GAME_LEAK)
    {
        return cap.max(BTTS_OPEN_GAME_CAP);
    }
    cap
}

fn btts_defense_cap(ga_home: f64, ga_away: f64) -> f64 {
    if ga_home < 0.70 && ga_away < 0.70 {
        0.55
    } else if ga_home < 0.80 && ga_away < 0.80 {
        0.65
    } else if ga_home < 0.90 || ga_away < 0.90 {
        0.75
    } else {
        0.90
    }
}

/// Raw BTTS probability, or `None` when the defences are too solid to
/// consider the market at all.
pub fn btts_probability(ctx: &FixtureContext) -> Option<f64> {
    if btts_vetoed(ctx) {
        return None;
    }
    let (home, away) = (&ctx.home, &ctx.away);
    let composite = |v: f64| v.clamp(BTTS_COMPOSITE_MIN, BTTS_COMPOSITE_MAX);

    let home_attack_vs_away_def = (home.goals_for + away.goals_against) / 2.0;
    let away_attack_vs_home_def = (away.goals_for + home.goals_against) / 2.0;
    let comp_goals = composite((home_attack_vs_away_def + away_attack_vs_home_def) / 2.0);
    let xg_intensity =
        (0.5 * (home.xg_for / BTTS_XG_SCALE) + 0.5 * (away.xg_for / BTTS_XG_SCALE)).min(1.0);
    let comp_xg = composite(xg_intensity);

    // Weight shifts toward goals/xG when there is no head-to-head history.
    let h2h_score = ctx.head_to_head.score;
    let (w_odds, w_goals, w_xg, w_h2h) = if h2h_score > 0.0 {
        (0.30, 0.30, 0.15, 0.20)
    } else {
        (0.30, 0.30, 0.25, 0.05)
    };
    let raw = w_odds * ctx.market.btts_yes + w_goals * comp_goals + w_xg * comp_xg + w_h2h * h2h_score;

    let cap = btts_cap(home, away);

    let xg_gap = (home.xg_for - away.xg_for).abs();
    let mut bonus = 0.0;
    if xg_gap <= BTTS_SYMMETRY_GAP && (home.xg_for + away.xg_for) / 2.0 >= BTTS_SYMMETRY_MIN_XG {
        bonus = BTTS_SYMMETRY_BONUS;
    }

    let mut p = (raw + bonus).clamp(BTTS_BLEND_MIN, BTTS_BLEND_MAX).min(cap);
    if xg_gap > BTTS_ASYMMETRY_GAP {
        p = (p - BTTS_ASYMMETRY_PENALTY).max(BTTS_BLEND_MIN);
    }
    Some(p)
}

fn btts_volume_ok(ctx: &FixtureContext) -> bool {
    let (home, away) = (&ctx.home, &ctx.away);
    home.goals_against >= BTTS_MIN_GOALS_AGAINST
        && away.goals_against >= BTTS_MIN_GOALS_AGAINST
        && home.goals_for >= BTTS_MIN_GOALS_FOR
        && away.goals_for >= BTTS_MIN_GOALS_FOR
        && home.xg_for >= BTTS_MIN_XG_FOR
        && away.xg_for >= BTTS_MIN_XG_FOR
}

/// Raw probability that `side` scores, or `None` when its attack or the
/// opposing defence is too weak to consider.
pub fn team_to_score_probability(ctx: &FixtureContext, side: Side) -> Option<f64> {
    let own = ctx.side(side);
    let opp = ctx.side(side.opponent());
    if own.goals_for < TEAM_MIN_GOALS_FOR
        || opp.goals_against < TEAM_MIN_OPP_GOALS_AGAINST
        || own.xg_for < TEAM_MIN_XG_FOR
    {
        return None;
    }
    let p = 0.55 * (own.xg_for / TEAM_XG_SCALE)
        + 0.20 * own.goals_for
        + 0.15 * ctx.head_to_head.score
        + 0.10 * (1.0 - 1.0 / (1.0 + opp.goals_against));
    Some(p.min(TEAM_MAX))
}

/// Scores one fixture. Errors only on malformed inputs; missing inputs
/// degrade to neutral defaults.
pub fn compute_signals(
    inputs: &FixtureInputs,
    factors: &CalibrationFactors,
    cfg: &ScoringConfig,
) -> Result<Vec<Signal>, ScoreError> {
    let ctx = FixtureContext::resolve(inputs)?;
    Ok(signals_for_context(&ctx, factors, cfg))
}

pub fn signals_for_context(
    ctx: &FixtureContext,
    factors: &CalibrationFactors,
    cfg: &ScoringConfig,
) -> Vec<Signal> {
    let actionable = ctx.core_missing() < cfg.low_data_missing.max(1);
    let emit = |pick: Pick, suggestion: String, confidence: f64, odd: Option<f64>| {
        let bet_type = pick.bet_type();
        let tier = if confidence >= cfg.very_conservative.for_type(bet_type) {
            ConfidenceTier::VeryConservative
        } else {
            ConfidenceTier::Conservative
        };
        Signal {
            fixture_id: ctx.fixture_id,
            pick,
            suggestion,
            confidence,
            odd,
            tier,
            source: SOURCE_FUSION.to_string(),
            actionable,
            outcome: OutcomeLabel::Pending,
        }
    };
    let passes = |bet_type: BetType, p: f64| p >= cfg.thresholds.for_type(bet_type);

    let mut out = Vec::new();

    let (side, p_result) = result_estimate(ctx);
    let p_result = calibrate(p_result * ctx.tier_factor, factors.factor(BetType::Result));
    if passes(BetType::Result, p_result) {
        let label = match side {
            Side::Home => "Home win",
            Side::Away => "Away win",
        };
        out.push(emit(
            Pick::Win(side),
            format!("{label}: {}", ctx.team_name(side)),
            p_result,
            ctx.prices.price(side),
        ));
    }

    let p_over = calibrate(
        over_1_5_probability(ctx) * ctx.tier_factor,
        factors.factor(BetType::Over15),
    );
    if passes(BetType::Over15, p_over) && ctx.xg_total() > OVER_XG_GATE {
        out.push(emit(
            Pick::Over15,
            "Over 1.5 goals".to_string(),
            p_over,
            ctx.prices.over_1_5,
        ));
    }

    if let Some(p_btts) = btts_probability(ctx) {
        let p_btts = calibrate(p_btts * ctx.tier_factor, factors.factor(BetType::Btts));
        if passes(BetType::Btts, p_btts) && btts_volume_ok(ctx) {
            out.push(emit(
                Pick::BothTeamsScore,
                "Both teams to score".to_string(),
                p_btts,
                ctx.prices.btts_yes,
            ));
        }
    }

    for side in [Side::Home, Side::Away] {
        let Some(p_team) = team_to_score_probability(ctx, side) else {
            continue;
        };
        let p_team = calibrate(p_team, factors.factor(BetType::TeamToScore));
        if passes(BetType::TeamToScore, p_team) {
            out.push(emit(
                Pick::TeamScores(side),
                format!("{} to score", ctx.team_name(side)),
                p_team,
                None,
            ));
        }
    }

    out
}
