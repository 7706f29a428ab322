use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type FixtureId = u64;
pub type TeamId = u32;
pub type CompetitionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    InPlay,
    Finished,
}

impl MatchStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, MatchStatus::Finished)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: CompetitionId,
    pub name: String,
    pub country: String,
    pub season: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    // Only needed for continental fixtures, where domestic form is blended in.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub domestic_competition_id: Option<CompetitionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u8,
    pub away: u8,
}

impl Score {
    pub fn new(home: u8, away: u8) -> Self {
        Self { home, away }
    }

    pub fn total(self) -> u16 {
        u16::from(self.home) + u16::from(self.away)
    }

    pub fn goals(self, side: Side) -> u8 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    pub fn winner(self) -> Option<Side> {
        if self.home > self.away {
            Some(Side::Home)
        } else if self.home < self.away {
            Some(Side::Away)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub competition: Competition,
    pub kickoff: DateTime<Utc>,
    pub home: Team,
    pub away: Team,
    pub status: MatchStatus,
    #[serde(default)]
    pub score: Option<Score>,
}

impl Fixture {
    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    /// Final score, only once the match is over.
    pub fn final_score(&self) -> Option<Score> {
        if self.status.is_completed() {
            self.score
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.home.name, self.away.name)
    }
}

/// Decimal market prices for one fixture. Any leg may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    #[serde(default)]
    pub home: Option<f64>,
    #[serde(default)]
    pub draw: Option<f64>,
    #[serde(default)]
    pub away: Option<f64>,
    #[serde(default)]
    pub over_1_5: Option<f64>,
    #[serde(default)]
    pub btts_yes: Option<f64>,
}

impl Odds {
    pub fn has_1x2(&self) -> bool {
        [self.home, self.draw, self.away]
            .iter()
            .all(|p| p.is_some_and(|v| v > 1.0))
    }

    pub fn price(&self, side: Side) -> Option<f64> {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }
}

/// One historical match as exposed by a statistics provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: FixtureId,
    pub competition_id: CompetitionId,
    pub season: u32,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_id: TeamId,
    pub away_id: TeamId,
    #[serde(default)]
    pub home_goals: Option<u8>,
    #[serde(default)]
    pub away_goals: Option<u8>,
    #[serde(default)]
    pub home_xg: Option<f64>,
    #[serde(default)]
    pub away_xg: Option<f64>,
}

impl MatchRecord {
    pub fn involves(&self, team_id: TeamId) -> bool {
        self.home_id == team_id || self.away_id == team_id
    }

    pub fn side_of(&self, team_id: TeamId) -> Option<Side> {
        if self.home_id == team_id {
            Some(Side::Home)
        } else if self.away_id == team_id {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn score(&self) -> Option<Score> {
        if !self.status.is_completed() {
            return None;
        }
        let (Some(home), Some(away)) = (self.home_goals, self.away_goals) else {
            return None;
        };
        Some(Score::new(home, away))
    }

    pub fn xg(&self, side: Side) -> Option<f64> {
        match side {
            Side::Home => self.home_xg,
            Side::Away => self.away_xg,
        }
        .filter(|v| v.is_finite() && *v >= 0.0)
    }
}
