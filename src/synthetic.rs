//! Seeded offline data: a plausible matchday snapshot and a settled signal
//! corpus. Same seed, same data.

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::fixture::{
    Competition, CompetitionId, Fixture, MatchRecord, MatchStatus, Odds, Score, Team, TeamId,
};
use crate::probs::{logistic, poisson_over};
use crate::providers::{Snapshot, XgRow, XgSource};
use crate::signal::{BetType, OutcomeLabel, SignalRecord};

const SEASON: u32 = 2025;
const HISTORY_PER_TEAM: usize = 12;
const BOOK_MARGIN: f64 = 1.05;

const LEAGUES: &[(CompetitionId, &str, &str)] = &[
    (39, "Premier League", "England"),
    (140, "La Liga", "Spain"),
    (78, "Bundesliga", "Germany"),
    (135, "Serie A", "Italy"),
    (61, "Ligue 1", "France"),
    (88, "Eredivisie", "Netherlands"),
    (94, "Primeira Liga", "Portugal"),
];
const CONTINENTAL: (CompetitionId, &str, &str) = (2, "UEFA Champions League", "World");

#[derive(Debug, Clone, Copy)]
struct Strength {
    attack: f64,
    defence: f64,
}

fn sample_poisson(rng: &mut StdRng, lambda: f64) -> u8 {
    let limit = (-lambda.max(0.0)).exp();
    let mut k = 0u8;
    let mut p = rng.gen_range(0.0..1.0);
    while p > limit && k < 12 {
        k += 1;
        p *= rng.gen_range(0.0..1.0);
    }
    k
}

fn sample_strength(rng: &mut StdRng) -> Strength {
    Strength {
        attack: rng.gen_range(0.7..2.1),
        defence: rng.gen_range(0.6..1.7),
    }
}

fn team(id: TeamId, country: &str, domestic: CompetitionId) -> Team {
    Team {
        id,
        name: format!("{country} {id}"),
        country: Some(country.to_string()),
        domestic_competition_id: Some(domestic),
    }
}

/// Past matches of `team_id` in one competition, all before `before`.
fn team_history(
    rng: &mut StdRng,
    team_id: TeamId,
    strength: Strength,
    competition_id: CompetitionId,
    before: chrono::DateTime<Utc>,
    next_id: &mut u64,
) -> Vec<MatchRecord> {
    let mut out = Vec::with_capacity(HISTORY_PER_TEAM);
    for i in 0..HISTORY_PER_TEAM {
        let opponent = sample_strength(rng);
        let own_lambda = (strength.attack * opponent.defence / 1.2).clamp(0.2, 3.5);
        let opp_lambda = (opponent.attack * strength.defence / 1.2).clamp(0.2, 3.5);
        let own_goals = sample_poisson(rng, own_lambda);
        let opp_goals = sample_poisson(rng, opp_lambda);
        let own_xg = (own_lambda + rng.gen_range(-0.3..0.3)).max(0.05);
        let opp_xg = (opp_lambda + rng.gen_range(-0.3..0.3)).max(0.05);
        let opponent_id = 90_000 + rng.gen_range(0..5_000);
        let at_home = i % 2 == 0;
        *next_id += 1;
        out.push(MatchRecord {
            id: *next_id,
            competition_id,
            season: SEASON,
            kickoff: before - Duration::days(7 * (i as i64 + 1)),
            status: MatchStatus::Finished,
            home_id: if at_home { team_id } else { opponent_id },
            away_id: if at_home { opponent_id } else { team_id },
            home_goals: Some(if at_home { own_goals } else { opp_goals }),
            away_goals: Some(if at_home { opp_goals } else { own_goals }),
            home_xg: Some(if at_home { own_xg } else { opp_xg }),
            away_xg: Some(if at_home { opp_xg } else { own_xg }),
        });
    }
    out
}

fn market_odds(rng: &mut StdRng, home: Strength, away: Strength) -> Odds {
    let lambda_home = (home.attack * away.defence / 1.2).clamp(0.2, 3.5);
    let lambda_away = (away.attack * home.defence / 1.2).clamp(0.2, 3.5);
    let edge = logistic(1.4 * (lambda_home - lambda_away) + 0.25);
    let p_draw = 0.26;
    let p_home = (1.0 - p_draw) * edge;
    let p_away = (1.0 - p_draw) * (1.0 - edge);
    let p_over = poisson_over(lambda_home + lambda_away, 1.5);
    let p_btts = (1.0 - (-lambda_home).exp()) * (1.0 - (-lambda_away).exp());
    let price = |p: f64| (1.0 / (p.clamp(0.02, 0.98) * BOOK_MARGIN)).max(1.01);

    Odds {
        home: Some(price(p_home)),
        draw: Some(price(p_draw)),
        away: Some(price(p_away)),
        over_1_5: rng.gen_bool(0.85).then(|| price(p_over)),
        btts_yes: rng.gen_bool(0.80).then(|| price(p_btts)),
    }
}

/// A matchday of `fixtures` games on `date`, with histories, odds and xG
/// deliberately left incomplete for some teams.
/// Fixture ids are unique per matchday so stored signals from different
/// days never collide.
fn fixture_id_base(date: NaiveDate) -> u64 {
    u64::from(date.num_days_from_ce().max(0).unsigned_abs()) * 10_000
}

pub fn synthetic_snapshot(date: NaiveDate, seed: u64, fixtures: usize) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut snapshot = Snapshot {
        date: Some(date),
        ..Snapshot::default()
    };
    let day_start = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap_or_default());
    let mut next_match_id = 1_000_000u64;
    let id_base = fixture_id_base(date);

    for i in 0..fixtures {
        let continental = i % 6 == 5;
        let (home_league, away_league) = if continental {
            let a = LEAGUES[rng.gen_range(0..LEAGUES.len())];
            let b = LEAGUES[rng.gen_range(0..LEAGUES.len())];
            (a, b)
        } else {
            let l = LEAGUES[i % LEAGUES.len()];
            (l, l)
        };
        let (comp_id, comp_name, comp_country) = if continental {
            CONTINENTAL
        } else {
            home_league
        };

        let home_id = 1_000 + 2 * i as TeamId;
        let away_id = home_id + 1;
        let home = team(home_id, home_league.2, home_league.0);
        let away = team(away_id, away_league.2, away_league.0);
        let home_strength = sample_strength(&mut rng);
        let away_strength = sample_strength(&mut rng);
        let kickoff = day_start + Duration::minutes(15 * i as i64);

        let fixture = Fixture {
            id: id_base + i as u64,
            competition: Competition {
                id: comp_id,
                name: comp_name.to_string(),
                country: comp_country.to_string(),
                season: SEASON,
            },
            kickoff,
            home,
            away,
            status: MatchStatus::NotStarted,
            score: None,
        };

        for (team_id, strength, domestic) in [
            (home_id, home_strength, home_league.0),
            (away_id, away_strength, away_league.0),
        ] {
            // Some teams are new to the dataset and have no history at all.
            if rng.gen_bool(0.08) {
                continue;
            }
            snapshot.history.extend(team_history(
                &mut rng,
                team_id,
                strength,
                comp_id,
                kickoff,
                &mut next_match_id,
            ));
            if continental {
                snapshot.history.extend(team_history(
                    &mut rng,
                    team_id,
                    strength,
                    domestic,
                    kickoff,
                    &mut next_match_id,
                ));
            }
            for (source, chance) in [(XgSource::Primary, 0.8), (XgSource::Secondary, 0.5)] {
                if rng.gen_bool(chance) {
                    snapshot.xg.push(XgRow {
                        team_id,
                        competition_id: comp_id,
                        season: SEASON,
                        source,
                        xg_for: (strength.attack * 0.9 + rng.gen_range(-0.2..0.2)).max(0.1),
                        xg_against: (strength.defence * 0.9 + rng.gen_range(-0.2..0.2)).max(0.1),
                    });
                }
            }
        }

        let meetings = rng.gen_range(0..6);
        for m in 0..meetings {
            let hg = sample_poisson(&mut rng, home_strength.attack);
            let ag = sample_poisson(&mut rng, away_strength.attack);
            next_match_id += 1;
            snapshot.history.push(MatchRecord {
                id: next_match_id,
                competition_id: comp_id,
                season: SEASON - 1 - m as u32,
                kickoff: kickoff - Duration::days(365 * (m as i64 + 1)),
                status: MatchStatus::Finished,
                home_id: if m % 2 == 0 { home_id } else { away_id },
                away_id: if m % 2 == 0 { away_id } else { home_id },
                home_goals: Some(hg),
                away_goals: Some(ag),
                home_xg: None,
                away_xg: None,
            });
        }

        if rng.gen_bool(0.9) {
            snapshot
                .odds
                .insert(fixture.id, market_odds(&mut rng, home_strength, away_strength));
        }
        snapshot.fixtures.push(fixture);
    }
    snapshot
}

/// Plays every fixture of the snapshot out.
pub fn finish_fixtures(snapshot: &mut Snapshot, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    for f in &mut snapshot.fixtures {
        let home = sample_poisson(&mut rng, 1.5);
        let away = sample_poisson(&mut rng, 1.1);
        f.status = MatchStatus::Finished;
        f.score = Some(Score::new(home, away));
    }
}

/// Settled signals whose hit rate tracks confidence a little below par,
/// the way an overconfident model's history looks.
pub fn synthetic_corpus(seed: u64, size: usize) -> Vec<SignalRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|_| {
            let bet_type = BetType::ALL[rng.gen_range(0..BetType::ALL.len())];
            let (_, league, _) = LEAGUES[rng.gen_range(0..LEAGUES.len())];
            let confidence: f64 = rng.gen_range(0.55..0.97);
            let won = rng.gen_bool((confidence * 0.9 + 0.04).clamp(0.0, 1.0));
            SignalRecord {
                bet_type,
                competition: league.to_string(),
                confidence,
                outcome: if won {
                    OutcomeLabel::Correct
                } else {
                    OutcomeLabel::Wrong
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{finish_fixtures, synthetic_corpus, synthetic_snapshot};

    #[test]
    fn same_seed_same_snapshot() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
        assert_eq!(
            synthetic_snapshot(date, 7, 12),
            synthetic_snapshot(date, 7, 12)
        );
        let snap = synthetic_snapshot(date, 7, 12);
        assert_eq!(snap.fixtures.len(), 12);
        assert!(snap.fixtures.iter().all(|f| f.kickoff.date_naive() == date));
        assert!(snap.history.iter().all(|m| m.kickoff.date_naive() < date));
    }

    #[test]
    fn fixture_ids_differ_across_matchdays() {
        let saturday = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
        let sunday = saturday.succ_opt().unwrap();
        let a = synthetic_snapshot(saturday, 7, 40);
        let b = synthetic_snapshot(sunday, 7, 40);
        assert!(
            a.fixtures
                .iter()
                .all(|f| b.fixtures.iter().all(|g| g.id != f.id))
        );
        assert!(a.fixtures.iter().all(|f| a.fixture(f.id) == Some(f)));
    }

    #[test]
    fn finished_fixtures_carry_scores() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
        let mut snap = synthetic_snapshot(date, 3, 4);
        finish_fixtures(&mut snap, 3);
        assert!(snap.fixtures.iter().all(|f| f.final_score().is_some()));
    }

    #[test]
    fn corpus_is_settled() {
        let corpus = synthetic_corpus(11, 200);
        assert_eq!(corpus.len(), 200);
        assert!(corpus.iter().all(|r| r.outcome.is_resolved()));
    }
}
