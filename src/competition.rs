use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::fixture::Competition;

const CONTINENTAL_COMPETITIONS: &[&str] = &[
    "UEFA Champions League",
    "UEFA Europa League",
    "UEFA Europa Conference League",
];

const DEFAULT_LEAGUE_STRENGTH: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeagueTier {
    Elite,
    SemiElite,
    Minor,
}

impl LeagueTier {
    /// Multiplier on Result/Over 1.5/BTTS confidence for continental fixtures.
    pub fn confidence_factor(self) -> f64 {
        match self {
            LeagueTier::Elite => 1.00,
            LeagueTier::SemiElite => 0.95,
            LeagueTier::Minor => 0.90,
        }
    }

    /// (domestic, continental) weights used when blending a team's form.
    pub fn form_weights(self) -> (f64, f64) {
        match self {
            LeagueTier::Elite => (0.65, 0.35),
            LeagueTier::SemiElite => (0.50, 0.50),
            LeagueTier::Minor => (0.35, 0.65),
        }
    }
}

static TIERS: Lazy<HashMap<&'static str, LeagueTier>> = Lazy::new(|| {
    let mut out = HashMap::new();
    for country in ["England", "Spain", "Germany", "Italy", "France"] {
        out.insert(country, LeagueTier::Elite);
    }
    for country in ["Netherlands", "Portugal", "Belgium", "Turkey", "Austria"] {
        out.insert(country, LeagueTier::SemiElite);
    }
    out
});

static LEAGUE_STRENGTH: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("Spain", 1.00),
        ("England", 1.00),
        ("Germany", 0.97),
        ("Italy", 0.95),
        ("France", 0.90),
        ("Netherlands", 0.88),
        ("Portugal", 0.86),
        ("Belgium", 0.84),
        ("Turkey", 0.83),
        ("Austria", 0.82),
        ("Croatia", 0.78),
        ("Scotland", 0.78),
        ("Denmark", 0.77),
        ("Greece", 0.76),
        ("Israel", 0.75),
    ])
});

// (country, league name) pairs scored by the daily run.
static RELEVANT_LEAGUES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("England", "Premier League"),
        ("England", "Championship"),
        ("Spain", "La Liga"),
        ("Spain", "Segunda División"),
        ("Germany", "Bundesliga"),
        ("Germany", "2. Bundesliga"),
        ("Italy", "Serie A"),
        ("Italy", "Serie B"),
        ("France", "Ligue 1"),
        ("France", "Ligue 2"),
        ("Netherlands", "Eredivisie"),
        ("Portugal", "Primeira Liga"),
        ("Belgium", "Jupiler Pro League"),
        ("Turkey", "Süper Lig"),
        ("Austria", "Bundesliga"),
        ("Scotland", "Premiership"),
        ("Switzerland", "Super League"),
        ("Greece", "Super League 1"),
        ("Denmark", "Superliga"),
    ]
});

pub fn tier_for_country(country: &str) -> LeagueTier {
    TIERS
        .get(country.trim())
        .copied()
        .unwrap_or(LeagueTier::Minor)
}

pub fn league_strength(country: &str) -> f64 {
    LEAGUE_STRENGTH
        .get(country.trim())
        .copied()
        .unwrap_or(DEFAULT_LEAGUE_STRENGTH)
}

pub fn is_continental(competition_name: &str) -> bool {
    let name = competition_name.to_ascii_lowercase();
    !name.is_empty()
        && CONTINENTAL_COMPETITIONS
            .iter()
            .any(|c| name.contains(&c.to_ascii_lowercase()))
}

pub fn is_relevant(competition: &Competition) -> bool {
    if is_continental(&competition.name) {
        return true;
    }
    RELEVANT_LEAGUES.iter().any(|(country, league)| {
        country.eq_ignore_ascii_case(competition.country.trim())
            && league.eq_ignore_ascii_case(competition.name.trim())
    })
}

/// Tier used for a continental fixture: the weaker of the two clubs' leagues.
pub fn fixture_tier(home_country: Option<&str>, away_country: Option<&str>) -> LeagueTier {
    let home = home_country.map(tier_for_country).unwrap_or(LeagueTier::Minor);
    let away = away_country.map(tier_for_country).unwrap_or(LeagueTier::Minor);
    home.max(away)
}

#[cfg(test)]
mod tests {
    use super::{LeagueTier, fixture_tier, is_continental, is_relevant, league_strength};
    use crate::fixture::Competition;

    #[test]
    fn continental_detection_is_substring_and_case_insensitive() {
        assert!(is_continental("UEFA Champions League - Qualification"));
        assert!(is_continental("uefa europa league"));
        assert!(!is_continental("Premier League"));
        assert!(!is_continental(""));
    }

    #[test]
    fn weaker_club_sets_fixture_tier() {
        assert_eq!(
            fixture_tier(Some("England"), Some("Spain")),
            LeagueTier::Elite
        );
        assert_eq!(
            fixture_tier(Some("England"), Some("Portugal")),
            LeagueTier::SemiElite
        );
        assert_eq!(fixture_tier(Some("Italy"), None), LeagueTier::Minor);
        assert!((LeagueTier::Minor.confidence_factor() - 0.90).abs() < 1e-12);
    }

    #[test]
    fn relevance_and_strength_defaults() {
        let epl = Competition {
            id: 39,
            name: "Premier League".to_string(),
            country: "England".to_string(),
            season: 2025,
        };
        let other = Competition {
            id: 999,
            name: "Premier League".to_string(),
            country: "Kazakhstan".to_string(),
            season: 2025,
        };
        assert!(is_relevant(&epl));
        assert!(!is_relevant(&other));
        assert!((league_strength("Nowhere") - 0.85).abs() < 1e-12);
    }
}
