use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fixture::{FixtureId, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Result,
    #[serde(rename = "over_1_5")]
    Over15,
    Btts,
    TeamToScore,
}

impl BetType {
    pub const ALL: [BetType; 4] = [
        BetType::Result,
        BetType::Over15,
        BetType::Btts,
        BetType::TeamToScore,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BetType::Result => "result",
            BetType::Over15 => "over_1_5",
            BetType::Btts => "btts",
            BetType::TeamToScore => "team_to_score",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BetType::Result => "Result",
            BetType::Over15 => "Over 1.5",
            BetType::Btts => "BTTS",
            BetType::TeamToScore => "Team to score",
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BetType::ALL
            .into_iter()
            .find(|t| t.key() == s.trim())
            .ok_or_else(|| format!("unknown bet type: {s}"))
    }
}

/// What exactly a signal backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    Win(Side),
    Over15,
    BothTeamsScore,
    TeamScores(Side),
}

impl Pick {
    pub fn bet_type(self) -> BetType {
        match self {
            Pick::Win(_) => BetType::Result,
            Pick::Over15 => BetType::Over15,
            Pick::BothTeamsScore => BetType::Btts,
            Pick::TeamScores(_) => BetType::TeamToScore,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Pick::Win(Side::Home) => "home_win",
            Pick::Win(Side::Away) => "away_win",
            Pick::Over15 => "over_1_5",
            Pick::BothTeamsScore => "btts_yes",
            Pick::TeamScores(Side::Home) => "home_scores",
            Pick::TeamScores(Side::Away) => "away_scores",
        }
    }
}

impl FromStr for Pick {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "home_win" => Ok(Pick::Win(Side::Home)),
            "away_win" => Ok(Pick::Win(Side::Away)),
            "over_1_5" => Ok(Pick::Over15),
            "btts_yes" => Ok(Pick::BothTeamsScore),
            "home_scores" => Ok(Pick::TeamScores(Side::Home)),
            "away_scores" => Ok(Pick::TeamScores(Side::Away)),
            other => Err(format!("unknown pick: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLabel {
    Pending,
    Correct,
    Wrong,
}

impl OutcomeLabel {
    pub fn key(self) -> &'static str {
        match self {
            OutcomeLabel::Pending => "pending",
            OutcomeLabel::Correct => "correct",
            OutcomeLabel::Wrong => "wrong",
        }
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, OutcomeLabel::Pending)
    }
}

impl FromStr for OutcomeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(OutcomeLabel::Pending),
            "correct" => Ok(OutcomeLabel::Correct),
            "wrong" => Ok(OutcomeLabel::Wrong),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Conservative,
    VeryConservative,
}

impl ConfidenceTier {
    pub fn key(self) -> &'static str {
        match self {
            ConfidenceTier::Conservative => "conservative",
            ConfidenceTier::VeryConservative => "very_conservative",
        }
    }
}

pub const SOURCE_FUSION: &str = "fusion";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub fixture_id: FixtureId,
    pub pick: Pick,
    pub suggestion: String,
    /// Calibrated model confidence in [0, 1].
    pub confidence: f64,
    /// Market price the signal refers to, when one was quoted.
    pub odd: Option<f64>,
    pub tier: ConfidenceTier,
    pub source: String,
    /// False when the fixture was scored on too much fallback data.
    pub actionable: bool,
    pub outcome: OutcomeLabel,
}

impl Signal {
    pub fn bet_type(&self) -> BetType {
        self.pick.bet_type()
    }

    pub fn confidence_pct(&self) -> f64 {
        self.confidence * 100.0
    }

    /// Price shown next to the signal; unusable quotes display as evens.
    pub fn display_odd(&self) -> f64 {
        self.odd.filter(|o| *o > 1.0).unwrap_or(2.0)
    }
}

/// A settled or pending signal as read back from the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub bet_type: BetType,
    pub competition: String,
    pub confidence: f64,
    pub outcome: OutcomeLabel,
}
