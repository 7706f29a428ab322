//! Resolution of everything a fixture is scored on into plain numbers.
//!
//! Collaborators hand over optional pieces (odds, forms, H2H, fused xG). This
//! module is the single place where absent pieces are replaced by neutral
//! defaults, and where each replacement is recorded so that the scorer can
//! tell how much of a fixture rests on fallbacks.

use serde::{Deserialize, Serialize};

use crate::competition::LeagueTier;
use crate::error::ScoreError;
use crate::fixture::{Fixture, FixtureId, Odds, Side};
use crate::form::{HeadToHead, TeamForm};
use crate::probs::{NEUTRAL_BINARY, implied_binary_prob, normalize_implied_probs};

const NEUTRAL_WIN_RATE: f64 = 1.0 / 3.0;
const MIN_XG: f64 = 0.2;
const DEFAULT_HOME_XG: f64 = 1.2;
const DEFAULT_AWAY_XG: f64 = 1.1;
const PRIMARY_XG_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    MarketResult,
    MarketOver15,
    MarketBtts,
    HomeForm,
    AwayForm,
    ExpectedGoals,
    HeadToHead,
}

impl Estimator {
    /// Estimators whose absence counts toward the low-data flag.
    pub fn is_core(self) -> bool {
        matches!(
            self,
            Estimator::MarketResult
                | Estimator::HomeForm
                | Estimator::AwayForm
                | Estimator::ExpectedGoals
        )
    }
}

/// Fused expected-goals rates for one team.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XgEstimate {
    pub xg_for: f64,
    pub xg_against: f64,
}

/// Weighted merge of two independent xG sources; either may be missing.
pub fn fuse_xg(primary: Option<f64>, secondary: Option<f64>) -> Option<f64> {
    let usable = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
    match (usable(primary), usable(secondary)) {
        (Some(p), Some(s)) => Some(PRIMARY_XG_WEIGHT * p + (1.0 - PRIMARY_XG_WEIGHT) * s),
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    }
}

/// Blends a team's domestic form into its continental form for cross-league
/// fixtures, then scales attacking xG by the strength of its home league.
pub fn blend_continental_form(
    continental: &TeamForm,
    domestic: &TeamForm,
    tier: LeagueTier,
    league_strength: f64,
) -> TeamForm {
    let (w_dom, w_cont) = tier.form_weights();
    let mut out = *continental;
    out.xg_for = (w_dom * domestic.xg_for + w_cont * continental.xg_for) * league_strength;
    out.xg_against = w_dom * domestic.xg_against + w_cont * continental.xg_against;
    out
}

/// Everything collaborators managed to supply for one fixture.
#[derive(Debug, Clone)]
pub struct FixtureInputs {
    pub fixture: Fixture,
    pub odds: Option<Odds>,
    pub home_form: Option<TeamForm>,
    pub away_form: Option<TeamForm>,
    pub head_to_head: Option<HeadToHead>,
    pub home_xg: Option<XgEstimate>,
    pub away_xg: Option<XgEstimate>,
    /// Set only for continental club competitions.
    pub tier: Option<LeagueTier>,
}

impl FixtureInputs {
    pub fn bare(fixture: Fixture) -> Self {
        Self {
            fixture,
            odds: None,
            home_form: None,
            away_form: None,
            head_to_head: None,
            home_xg: None,
            away_xg: None,
            tier: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketProbs {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub over_1_5: f64,
    pub btts_yes: f64,
}

impl MarketProbs {
    pub fn win(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideContext {
    pub win_rate: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub xg_for: f64,
    pub xg_against: f64,
}

/// Fully resolved numeric view of a fixture. No field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureContext {
    pub fixture_id: FixtureId,
    pub home_name: String,
    pub away_name: String,
    pub market: MarketProbs,
    pub prices: Odds,
    pub home: SideContext,
    pub away: SideContext,
    pub head_to_head: HeadToHead,
    pub tier_factor: f64,
    pub fallbacks: Vec<Estimator>,
}

impl FixtureContext {
    pub fn resolve(inputs: &FixtureInputs) -> Result<Self, ScoreError> {
        validate(inputs)?;

        let mut fallbacks = Vec::new();
        let prices = inputs.odds.unwrap_or_default();

        if !prices.has_1x2() {
            fallbacks.push(Estimator::MarketResult);
        }
        let (home, draw, away) = normalize_implied_probs(prices.home, prices.draw, prices.away);
        let over_1_5 = implied_binary_prob(prices.over_1_5).unwrap_or_else(|| {
            fallbacks.push(Estimator::MarketOver15);
            NEUTRAL_BINARY
        });
        let btts_yes = implied_binary_prob(prices.btts_yes).unwrap_or_else(|| {
            fallbacks.push(Estimator::MarketBtts);
            NEUTRAL_BINARY
        });

        let home_form = inputs.home_form.filter(|f| !f.is_empty());
        let away_form = inputs.away_form.filter(|f| !f.is_empty());
        if home_form.is_none() {
            fallbacks.push(Estimator::HomeForm);
        }
        if away_form.is_none() {
            fallbacks.push(Estimator::AwayForm);
        }
        if inputs.home_xg.is_none() && inputs.away_xg.is_none() {
            fallbacks.push(Estimator::ExpectedGoals);
        }
        let head_to_head = match inputs.head_to_head {
            Some(h) if !h.is_empty() => h,
            _ => {
                fallbacks.push(Estimator::HeadToHead);
                HeadToHead::empty()
            }
        };

        Ok(Self {
            fixture_id: inputs.fixture.id,
            home_name: inputs.fixture.home.name.clone(),
            away_name: inputs.fixture.away.name.clone(),
            market: MarketProbs {
                home,
                draw,
                away,
                over_1_5,
                btts_yes,
            },
            prices,
            home: side_context(home_form, inputs.home_xg, DEFAULT_HOME_XG),
            away: side_context(away_form, inputs.away_xg, DEFAULT_AWAY_XG),
            head_to_head,
            tier_factor: inputs.tier.map(LeagueTier::confidence_factor).unwrap_or(1.0),
            fallbacks,
        })
    }

    pub fn side(&self, side: Side) -> &SideContext {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn team_name(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_name,
            Side::Away => &self.away_name,
        }
    }

    pub fn core_missing(&self) -> usize {
        self.fallbacks.iter().filter(|e| e.is_core()).count()
    }

    pub fn xg_total(&self) -> f64 {
        self.home.xg_for + self.away.xg_for
    }
}

fn side_context(form: Option<TeamForm>, xg: Option<XgEstimate>, default_xg: f64) -> SideContext {
    let base = form.unwrap_or_default();
    let form_xg = form.map(|f| f.xg_for);
    let xg_for = xg
        .map(|x| x.xg_for)
        .filter(|v| *v > 0.0)
        .or(form_xg)
        .unwrap_or(default_xg)
        .max(MIN_XG);
    let xg_against = xg
        .map(|x| x.xg_against)
        .filter(|v| *v > 0.0)
        .unwrap_or(base.xg_against);
    SideContext {
        win_rate: form.and_then(|f| f.win_rate()).unwrap_or(NEUTRAL_WIN_RATE),
        goals_for: base.goals_for,
        goals_against: base.goals_against,
        xg_for,
        xg_against,
    }
}

fn validate(inputs: &FixtureInputs) -> Result<(), ScoreError> {
    let mut fields: Vec<(&'static str, f64)> = Vec::new();
    for (name, form) in [("home_form", inputs.home_form), ("away_form", inputs.away_form)] {
        if let Some(f) = form {
            fields.push((name, f.goals_for));
            fields.push((name, f.goals_against));
            fields.push((name, f.xg_for));
            fields.push((name, f.xg_against));
        }
    }
    for (name, xg) in [("home_xg", inputs.home_xg), ("away_xg", inputs.away_xg)] {
        if let Some(x) = xg {
            fields.push((name, x.xg_for));
            fields.push((name, x.xg_against));
        }
    }
    if let Some(h) = inputs.head_to_head {
        fields.push(("head_to_head", h.score));
        fields.push(("head_to_head", h.btts_pct));
    }
    if let Some(t) = inputs.odds {
        for price in [t.home, t.draw, t.away, t.over_1_5, t.btts_yes]
            .into_iter()
            .flatten()
        {
            if !price.is_finite() {
                return Err(ScoreError::NonFinite { field: "odds" });
            }
        }
    }

    for (field, value) in fields {
        if !value.is_finite() {
            return Err(ScoreError::NonFinite { field });
        }
        if value < 0.0 {
            return Err(ScoreError::Negative { field, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Estimator, FixtureContext, FixtureInputs, XgEstimate, blend_continental_form, fuse_xg};
    use crate::competition::LeagueTier;
    use crate::error::ScoreError;
    use crate::fixture::{Competition, Fixture, MatchStatus, Odds, Team};
    use crate::form::TeamForm;

    fn fixture() -> Fixture {
        Fixture {
            id: 7,
            competition: Competition {
                id: 39,
                name: "Premier League".to_string(),
                country: "England".to_string(),
                season: 2025,
            },
            kickoff: Utc.with_ymd_and_hms(2025, 10, 4, 14, 0, 0).unwrap(),
            home: Team {
                id: 1,
                name: "Home".to_string(),
                country: None,
                domestic_competition_id: None,
            },
            away: Team {
                id: 2,
                name: "Away".to_string(),
                country: None,
                domestic_competition_id: None,
            },
            status: MatchStatus::NotStarted,
            score: None,
        }
    }

    #[test]
    fn bare_fixture_resolves_to_neutral_defaults() {
        let ctx = FixtureContext::resolve(&FixtureInputs::bare(fixture())).unwrap();
        assert!((ctx.market.home - 1.0 / 3.0).abs() < 1e-12);
        assert!((ctx.market.over_1_5 - 0.5).abs() < 1e-12);
        assert!((ctx.home.goals_for - 1.2).abs() < 1e-12);
        assert!((ctx.away.goals_against - 1.1).abs() < 1e-12);
        assert!((ctx.home.xg_for - 1.2).abs() < 1e-12);
        assert!((ctx.away.xg_for - 1.1).abs() < 1e-12);
        assert_eq!(ctx.core_missing(), 4);
        assert!(ctx.fallbacks.contains(&Estimator::HeadToHead));
        assert_eq!(ctx.tier_factor, 1.0);
    }

    #[test]
    fn complete_inputs_have_no_core_fallbacks() {
        let mut inputs = FixtureInputs::bare(fixture());
        inputs.odds = Some(Odds {
            home: Some(2.0),
            draw: Some(3.3),
            away: Some(3.8),
            over_1_5: Some(1.3),
            btts_yes: Some(1.8),
        });
        let form = TeamForm {
            matches: 5,
            wins: 3,
            draws: 1,
            losses: 1,
            goals_for: 1.8,
            goals_against: 1.0,
            xg_for: 1.6,
            xg_against: 1.1,
        };
        inputs.home_form = Some(form);
        inputs.away_form = Some(form);
        inputs.home_xg = Some(XgEstimate {
            xg_for: 0.1,
            xg_against: 1.0,
        });
        inputs.tier = Some(LeagueTier::SemiElite);
        let ctx = FixtureContext::resolve(&inputs).unwrap();
        assert_eq!(ctx.core_missing(), 0);
        assert!((ctx.home.win_rate - 0.6).abs() < 1e-12);
        // Fused xG below the floor is lifted to it.
        assert!((ctx.home.xg_for - 0.2).abs() < 1e-12);
        assert!((ctx.away.xg_for - 1.6).abs() < 1e-12);
        assert!((ctx.tier_factor - 0.95).abs() < 1e-12);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut inputs = FixtureInputs::bare(fixture());
        inputs.away_xg = Some(XgEstimate {
            xg_for: f64::NAN,
            xg_against: 1.0,
        });
        assert_eq!(
            FixtureContext::resolve(&inputs).unwrap_err(),
            ScoreError::NonFinite { field: "away_xg" }
        );
    }

    #[test]
    fn xg_fusion_prefers_primary() {
        assert!((fuse_xg(Some(2.0), Some(1.0)).unwrap() - 1.7).abs() < 1e-12);
        assert_eq!(fuse_xg(None, Some(1.1)), Some(1.1));
        assert_eq!(fuse_xg(Some(0.0), None), None);
    }

    #[test]
    fn continental_blend_uses_tier_weights() {
        let domestic = TeamForm {
            xg_for: 2.0,
            xg_against: 1.0,
            ..TeamForm::empty()
        };
        let continental = TeamForm {
            xg_for: 1.0,
            xg_against: 2.0,
            ..TeamForm::empty()
        };
        let out = blend_continental_form(&continental, &domestic, LeagueTier::Elite, 1.0);
        assert!((out.xg_for - 1.65).abs() < 1e-12);
        assert!((out.xg_against - 1.35).abs() < 1e-12);
    }
}
