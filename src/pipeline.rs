//! One scoring run: gather context per fixture, score everything in
//! parallel, and summarise what happened.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationFactors;
use crate::competition::{
    fixture_tier, is_continental, is_relevant, league_strength, tier_for_country,
};
use crate::context::{
    Estimator, FixtureContext, FixtureInputs, XgEstimate, blend_continental_form, fuse_xg,
};
use crate::error::ProviderError;
use crate::fixture::{Fixture, Side};
use crate::form::{
    FormCache, FormKey, FormQuery, HeadToHead, HeadToHeadCache, HeadToHeadKey, SideFilter,
    TeamForm, build_head_to_head, build_team_form,
};
use crate::providers::{FixtureProvider, OddsProvider, StatsProvider, XgProvider, XgSource};
use crate::scorer::{ScoringConfig, signals_for_context};
use crate::signal::{BetType, Signal};

/// The collaborators a run reads from.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub fixtures: &'a dyn FixtureProvider,
    pub odds: &'a dyn OddsProvider,
    pub stats: &'a dyn StatsProvider,
    pub xg: &'a dyn XgProvider,
}

impl<'a> Sources<'a> {
    /// All four contracts served by one value, e.g. a snapshot.
    pub fn single<P>(provider: &'a P) -> Self
    where
        P: FixtureProvider + OddsProvider + StatsProvider + XgProvider,
    {
        Self {
            fixtures: provider,
            odds: provider,
            stats: provider,
            xg: provider,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture: Fixture,
    pub signals: Vec<Signal>,
    pub fallbacks: Vec<Estimator>,
    pub low_confidence: bool,
    /// Set when the fixture could not be scored at all.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub date: Option<NaiveDate>,
    pub fixtures_seen: usize,
    pub filtered_out: usize,
    pub scored: usize,
    pub failed: usize,
    pub low_confidence: usize,
    pub signals_by_type: BTreeMap<BetType, usize>,
    pub fallbacks: BTreeMap<Estimator, usize>,
}

impl RunSummary {
    pub fn signals_total(&self) -> usize {
        self.signals_by_type.values().sum()
    }

    fn absorb(&mut self, report: &FixtureReport) {
        if report.error.is_some() {
            self.failed += 1;
            return;
        }
        self.scored += 1;
        if report.low_confidence {
            self.low_confidence += 1;
        }
        for s in &report.signals {
            *self.signals_by_type.entry(s.bet_type()).or_default() += 1;
        }
        for e in &report.fallbacks {
            *self.fallbacks.entry(*e).or_default() += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub reports: Vec<FixtureReport>,
    pub summary: RunSummary,
}

/// Scoring run with caches that live exactly as long as the run.
pub struct Pipeline<'a> {
    sources: Sources<'a>,
    factors: &'a CalibrationFactors,
    scoring: ScoringConfig,
    h2h_window: usize,
    relevant_only: bool,
    forms: FormCache,
    meetings: HeadToHeadCache,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        sources: Sources<'a>,
        factors: &'a CalibrationFactors,
        scoring: ScoringConfig,
        h2h_window: usize,
    ) -> Self {
        Self {
            sources,
            factors,
            scoring,
            h2h_window: h2h_window.max(1),
            relevant_only: true,
            forms: FormCache::new(),
            meetings: HeadToHeadCache::new(),
        }
    }

    /// Score every fixture the provider returns, not just the major leagues.
    pub fn all_competitions(mut self) -> Self {
        self.relevant_only = false;
        self
    }

    pub fn cached_forms(&self) -> usize {
        self.forms.len()
    }

    /// Fetches the matchday and scores it. A provider failure on the fixture
    /// list yields an empty run, never an error.
    pub fn run(&self, date: NaiveDate, pool: Option<&rayon::ThreadPool>) -> RunOutput {
        let fixtures = match self.sources.fixtures.fixtures_on(date) {
            Ok(list) => list,
            Err(err) => {
                warn!(%date, error = %err, "fixture provider failed; empty run");
                Vec::new()
            }
        };
        let seen = fixtures.len();
        let kept: Vec<Fixture> = if self.relevant_only {
            fixtures
                .into_iter()
                .filter(|f| is_relevant(&f.competition))
                .collect()
        } else {
            fixtures
        };

        let reports = with_pool(pool, || self.score_fixtures(&kept));

        let mut summary = RunSummary {
            date: Some(date),
            fixtures_seen: seen,
            filtered_out: seen - kept.len(),
            ..RunSummary::default()
        };
        for report in &reports {
            summary.absorb(report);
        }
        info!(
            %date,
            fixtures = summary.fixtures_seen,
            scored = summary.scored,
            failed = summary.failed,
            low_confidence = summary.low_confidence,
            signals = summary.signals_total(),
            "scoring run complete"
        );
        RunOutput { reports, summary }
    }

    /// Scores fixtures in parallel; output order matches input order.
    pub fn score_fixtures(&self, fixtures: &[Fixture]) -> Vec<FixtureReport> {
        fixtures
            .par_iter()
            .map(|f| {
                catch_unwind(AssertUnwindSafe(|| self.score_one(f))).unwrap_or_else(|payload| {
                    let detail = panic_message(payload.as_ref());
                    warn!(fixture = f.id, error = %detail, "fixture scoring panicked");
                    FixtureReport {
                        fixture: f.clone(),
                        signals: Vec::new(),
                        fallbacks: Vec::new(),
                        low_confidence: true,
                        error: Some(format!("panicked: {detail}")),
                    }
                })
            })
            .collect()
    }

    pub fn score_one(&self, fixture: &Fixture) -> FixtureReport {
        let inputs = self.gather_inputs(fixture);
        match FixtureContext::resolve(&inputs) {
            Ok(ctx) => {
                let signals = signals_for_context(&ctx, self.factors, &self.scoring);
                let low_confidence = ctx.core_missing() >= self.scoring.low_data_missing;
                if low_confidence {
                    debug!(
                        fixture = fixture.id,
                        missing = ctx.core_missing(),
                        "scored on fallback data; signals are informational"
                    );
                }
                FixtureReport {
                    fixture: fixture.clone(),
                    signals,
                    fallbacks: ctx.fallbacks,
                    low_confidence,
                    error: None,
                }
            }
            Err(err) => {
                warn!(fixture = fixture.id, error = %err, "fixture skipped");
                FixtureReport {
                    fixture: fixture.clone(),
                    signals: Vec::new(),
                    fallbacks: Vec::new(),
                    low_confidence: true,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Collects whatever the collaborators can supply. Individual failures
    /// are logged and left as `None`.
    pub fn gather_inputs(&self, fixture: &Fixture) -> FixtureInputs {
        let mut inputs = FixtureInputs::bare(fixture.clone());
        inputs.odds = soft(fixture, "odds", self.sources.odds.odds_for(fixture)).flatten();

        let continental = is_continental(&fixture.competition.name);
        for side in [Side::Home, Side::Away] {
            let filter = match side {
                Side::Home => SideFilter::Home,
                Side::Away => SideFilter::Away,
            };
            let mut form = self.team_form(fixture, side, fixture.competition.id, filter);
            let mut xg = self.fused_xg(fixture, side);

            if continental {
                let team = fixture.team(side);
                let domestic = team
                    .domestic_competition_id
                    .and_then(|comp| self.team_form(fixture, side, comp, filter));
                if let (Some(cont), Some(dom)) = (form, domestic) {
                    let country = team.country.as_deref().unwrap_or_default();
                    let blended = blend_continental_form(
                        &cont,
                        &dom,
                        tier_for_country(country),
                        league_strength(country),
                    );
                    xg = xg.or(Some(XgEstimate {
                        xg_for: blended.xg_for,
                        xg_against: blended.xg_against,
                    }));
                    form = Some(blended);
                }
            }

            match side {
                Side::Home => {
                    inputs.home_form = form;
                    inputs.home_xg = xg;
                }
                Side::Away => {
                    inputs.away_form = form;
                    inputs.away_xg = xg;
                }
            }
        }

        inputs.head_to_head = self.head_to_head(fixture);
        if continental {
            inputs.tier = Some(fixture_tier(
                fixture.home.country.as_deref(),
                fixture.away.country.as_deref(),
            ));
        }
        inputs
    }

    fn team_form(
        &self,
        fixture: &Fixture,
        side: Side,
        competition_id: u32,
        filter: SideFilter,
    ) -> Option<TeamForm> {
        let query = FormQuery {
            team_id: fixture.team(side).id,
            competition_id,
            season: fixture.competition.season,
            side: filter,
            reference: Some(fixture.kickoff),
        };
        let form = self
            .forms
            .get_or_try_insert_with(FormKey::from(&query), || {
                self.sources
                    .stats
                    .team_matches(query.team_id, competition_id, query.season)
                    .map(|history| build_team_form(&history, &query))
            });
        soft(fixture, "team form", form).filter(|f| !f.is_empty())
    }

    fn head_to_head(&self, fixture: &Fixture) -> Option<HeadToHead> {
        let key = HeadToHeadKey {
            team_a: fixture.home.id,
            team_b: fixture.away.id,
            window: self.h2h_window,
        };
        let h2h = self.meetings.get_or_try_insert_with(key, || {
            self.sources
                .stats
                .meetings(key.team_a, key.team_b)
                .map(|rows| build_head_to_head(key.team_a, key.team_b, &rows, key.window))
        });
        soft(fixture, "head-to-head", h2h).filter(|h| !h.is_empty())
    }

    fn fused_xg(&self, fixture: &Fixture, side: Side) -> Option<XgEstimate> {
        let team = fixture.team(side).id;
        let comp = fixture.competition.id;
        let season = fixture.competition.season;
        let fetch = |source| {
            soft(fixture, "xg", self.sources.xg.team_xg(source, team, comp, season)).flatten()
        };
        let primary = fetch(XgSource::Primary);
        let secondary = fetch(XgSource::Secondary);

        let xg_for = fuse_xg(primary.map(|x| x.xg_for), secondary.map(|x| x.xg_for))?;
        let xg_against = fuse_xg(
            primary.map(|x| x.xg_against),
            secondary.map(|x| x.xg_against),
        )
        .unwrap_or(0.0);
        Some(XgEstimate { xg_for, xg_against })
    }
}

fn soft<T>(fixture: &Fixture, what: &str, result: Result<T, ProviderError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(err) => {
            warn!(fixture = fixture.id, error = %err, "{what} unavailable");
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn build_pool(threads: Option<usize>) -> Option<rayon::ThreadPool> {
    let threads = threads?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

fn with_pool<T>(pool: Option<&rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match pool {
        Some(pool) => pool.install(action),
        None => action(),
    }
}
