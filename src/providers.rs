//! Collaborator contracts and an offline implementation backed by one JSON
//! snapshot per matchday.
//!
//! Every provider call is a single data point: failures come back as
//! [`ProviderError`] and callers treat them as missing context.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::context::XgEstimate;
use crate::error::ProviderError;
use crate::fixture::{CompetitionId, Fixture, FixtureId, MatchRecord, Odds, TeamId};

pub trait FixtureProvider: Send + Sync {
    fn fixtures_on(&self, date: NaiveDate) -> Result<Vec<Fixture>, ProviderError>;
}

pub trait OddsProvider: Send + Sync {
    /// `Ok(None)` when the market simply has no quote.
    fn odds_for(&self, fixture: &Fixture) -> Result<Option<Odds>, ProviderError>;
}

pub trait StatsProvider: Send + Sync {
    /// A team's matches in one competition and season, any status.
    fn team_matches(
        &self,
        team: TeamId,
        competition: CompetitionId,
        season: u32,
    ) -> Result<Vec<MatchRecord>, ProviderError>;

    /// Meetings between two teams across all competitions.
    fn meetings(&self, team_a: TeamId, team_b: TeamId) -> Result<Vec<MatchRecord>, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XgSource {
    Primary,
    Secondary,
}

pub trait XgProvider: Send + Sync {
    fn team_xg(
        &self,
        source: XgSource,
        team: TeamId,
        competition: CompetitionId,
        season: u32,
    ) -> Result<Option<XgEstimate>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgRow {
    pub team_id: TeamId,
    pub competition_id: CompetitionId,
    pub season: u32,
    pub source: XgSource,
    pub xg_for: f64,
    pub xg_against: f64,
}

/// Everything the collaborators know about one matchday.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub odds: BTreeMap<FixtureId, Odds>,
    #[serde(default)]
    pub history: Vec<MatchRecord>,
    #[serde(default)]
    pub xg: Vec<XgRow>,
}

pub fn snapshot_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.json", date.format("%Y-%m-%d")))
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ProviderError::NotFound(path.display().to_string()),
            _ => ProviderError::Io(err),
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load_for(dir: &Path, date: NaiveDate) -> Result<Self, ProviderError> {
        let mut snapshot = Self::load(&snapshot_path(dir, date))?;
        snapshot.date.get_or_insert(date);
        Ok(snapshot)
    }

    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.id == id)
    }
}

impl FixtureProvider for Snapshot {
    fn fixtures_on(&self, date: NaiveDate) -> Result<Vec<Fixture>, ProviderError> {
        if let Some(own) = self.date
            && own != date
        {
            return Err(ProviderError::NotFound(format!("fixtures for {date}")));
        }
        Ok(self
            .fixtures
            .iter()
            .filter(|f| f.kickoff.date_naive() == date)
            .cloned()
            .collect())
    }
}

impl OddsProvider for Snapshot {
    fn odds_for(&self, fixture: &Fixture) -> Result<Option<Odds>, ProviderError> {
        Ok(self.odds.get(&fixture.id).copied())
    }
}

impl StatsProvider for Snapshot {
    fn team_matches(
        &self,
        team: TeamId,
        competition: CompetitionId,
        season: u32,
    ) -> Result<Vec<MatchRecord>, ProviderError> {
        Ok(self
            .history
            .iter()
            .filter(|m| m.involves(team) && m.competition_id == competition && m.season == season)
            .cloned()
            .collect())
    }

    fn meetings(&self, team_a: TeamId, team_b: TeamId) -> Result<Vec<MatchRecord>, ProviderError> {
        Ok(self
            .history
            .iter()
            .filter(|m| m.involves(team_a) && m.involves(team_b))
            .cloned()
            .collect())
    }
}

impl XgProvider for Snapshot {
    fn team_xg(
        &self,
        source: XgSource,
        team: TeamId,
        competition: CompetitionId,
        season: u32,
    ) -> Result<Option<XgEstimate>, ProviderError> {
        Ok(self
            .xg
            .iter()
            .find(|r| {
                r.source == source
                    && r.team_id == team
                    && r.competition_id == competition
                    && r.season == season
            })
            .map(|r| XgEstimate {
                xg_for: r.xg_for,
                xg_against: r.xg_against,
            }))
    }
}
