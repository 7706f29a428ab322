use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fixture::{CompetitionId, MatchRecord, Side, TeamId};

pub const FORM_WINDOW: usize = 10;
pub const DEFAULT_H2H_WINDOW: usize = 10;
pub const DEFAULT_GOALS_FOR: f64 = 1.2;
pub const DEFAULT_GOALS_AGAINST: f64 = 1.1;
const H2H_WEIGHTED_MIN_SAMPLE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideFilter {
    Overall,
    Home,
    Away,
}

impl SideFilter {
    fn accepts(self, side: Side) -> bool {
        match self {
            SideFilter::Overall => true,
            SideFilter::Home => side == Side::Home,
            SideFilter::Away => side == Side::Away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormQuery {
    pub team_id: TeamId,
    pub competition_id: CompetitionId,
    pub season: u32,
    pub side: SideFilter,
    /// Matches kicking off after this instant are ignored.
    pub reference: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: f64,
    pub goals_against: f64,
    pub xg_for: f64,
    pub xg_against: f64,
}

impl TeamForm {
    pub fn empty() -> Self {
        Self {
            matches: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: DEFAULT_GOALS_FOR,
            goals_against: DEFAULT_GOALS_AGAINST,
            xg_for: DEFAULT_GOALS_FOR,
            xg_against: DEFAULT_GOALS_AGAINST,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches == 0
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.matches == 0 {
            return None;
        }
        Some(self.wins as f64 / self.matches as f64)
    }
}

impl Default for TeamForm {
    fn default() -> Self {
        Self::empty()
    }
}

/// Recent form of one team over its last [`FORM_WINDOW`] completed matches in
/// the queried competition and season.
pub fn build_team_form(history: &[MatchRecord], query: &FormQuery) -> TeamForm {
    let mut window: Vec<&MatchRecord> = history
        .iter()
        .filter(|m| m.involves(query.team_id))
        .filter(|m| m.competition_id == query.competition_id && m.season == query.season)
        .filter(|m| m.score().is_some())
        .collect();
    window.sort_by(|a, b| b.kickoff.cmp(&a.kickoff).then(b.id.cmp(&a.id)));
    window.truncate(FORM_WINDOW);

    let mut wins = 0usize;
    let mut draws = 0usize;
    let mut losses = 0usize;
    let mut gf = 0.0_f64;
    let mut ga = 0.0_f64;
    let mut xg_for = 0.0_f64;
    let mut xg_against = 0.0_f64;
    let mut n = 0usize;

    for m in window {
        if let Some(reference) = query.reference
            && m.kickoff > reference
        {
            continue;
        }
        let Some(side) = m.side_of(query.team_id) else {
            continue;
        };
        if !query.side.accepts(side) {
            continue;
        }
        let Some(score) = m.score() else {
            continue;
        };

        gf += f64::from(score.goals(side));
        ga += f64::from(score.goals(side.opponent()));
        match score.winner() {
            Some(w) if w == side => wins += 1,
            Some(_) => losses += 1,
            None => draws += 1,
        }
        xg_for += m.xg(side).unwrap_or(0.0);
        xg_against += m.xg(side.opponent()).unwrap_or(0.0);
        n += 1;
    }

    if n == 0 {
        return TeamForm::empty();
    }

    let goals_for = gf / n as f64;
    let goals_against = ga / n as f64;
    // Matches without xG count as zero; only a window with no xG at all
    // falls back to goals.
    let xg_for = if xg_for > 0.0 { xg_for / n as f64 } else { goals_for };
    let xg_against = if xg_against > 0.0 {
        xg_against / n as f64
    } else {
        goals_against
    };

    TeamForm {
        matches: n,
        wins,
        draws,
        losses,
        goals_for,
        goals_against,
        xg_for,
        xg_against,
    }
}

/// Summary of recent meetings, seen from `team_a`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub matches: usize,
    pub btts_pct: f64,
    /// Goals scored by team A as host, averaged over all meetings.
    pub goals_for_home: f64,
    pub goals_against_home: f64,
    /// Goals scored by team A as visitor, averaged over all meetings.
    pub goals_for_away: f64,
    pub goals_against_away: f64,
    pub a_win_pct: f64,
    pub b_win_pct: f64,
    pub score: f64,
}

impl HeadToHead {
    pub fn empty() -> Self {
        Self {
            matches: 0,
            btts_pct: 0.0,
            goals_for_home: 0.0,
            goals_against_home: 0.0,
            goals_for_away: 0.0,
            goals_against_away: 0.0,
            a_win_pct: 0.0,
            b_win_pct: 0.0,
            score: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches == 0
    }

    /// Fraction of meetings won by the given side of the upcoming fixture,
    /// where team A is the host.
    pub fn win_pct(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.a_win_pct,
            Side::Away => self.b_win_pct,
        }
    }
}

impl Default for HeadToHead {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn head_to_head_score(
    matches: usize,
    btts_pct: f64,
    goals_for_home: f64,
    goals_against_home: f64,
    goals_for_away: f64,
    goals_against_away: f64,
) -> f64 {
    if matches == 0 {
        return 0.0;
    }
    if matches >= H2H_WEIGHTED_MIN_SAMPLE {
        (btts_pct / 100.0) * 0.6
            + (goals_for_home + goals_for_away) * 0.2
            + (goals_against_home + goals_against_away) * 0.2
    } else {
        (goals_for_home + goals_for_away + goals_against_home + goals_against_away) / 4.0
    }
}

/// Aggregates the last `window` completed meetings between the two teams,
/// regardless of competition.
pub fn build_head_to_head(
    team_a: TeamId,
    team_b: TeamId,
    meetings: &[MatchRecord],
    window: usize,
) -> HeadToHead {
    let mut rows: Vec<&MatchRecord> = meetings
        .iter()
        .filter(|m| m.involves(team_a) && m.involves(team_b) && team_a != team_b)
        .filter(|m| m.score().is_some())
        .collect();
    rows.sort_by(|a, b| b.kickoff.cmp(&a.kickoff).then(b.id.cmp(&a.id)));
    rows.truncate(window.max(1));

    let mut both = 0usize;
    let mut a_wins = 0usize;
    let mut b_wins = 0usize;
    let mut gf_home = 0.0_f64;
    let mut ga_home = 0.0_f64;
    let mut gf_away = 0.0_f64;
    let mut ga_away = 0.0_f64;
    let mut n = 0usize;

    for m in rows {
        let (Some(score), Some(a_side)) = (m.score(), m.side_of(team_a)) else {
            continue;
        };
        if score.home > 0 && score.away > 0 {
            both += 1;
        }
        let scored = f64::from(score.goals(a_side));
        let conceded = f64::from(score.goals(a_side.opponent()));
        match a_side {
            Side::Home => {
                gf_home += scored;
                ga_home += conceded;
            }
            Side::Away => {
                gf_away += scored;
                ga_away += conceded;
            }
        }
        match score.winner() {
            Some(w) if w == a_side => a_wins += 1,
            Some(_) => b_wins += 1,
            None => {}
        }
        n += 1;
    }

    if n == 0 {
        return HeadToHead::empty();
    }

    let nf = n as f64;
    let btts_pct = 100.0 * both as f64 / nf;
    let (gf_home, ga_home, gf_away, ga_away) = (gf_home / nf, ga_home / nf, gf_away / nf, ga_away / nf);
    HeadToHead {
        matches: n,
        btts_pct,
        goals_for_home: gf_home,
        goals_against_home: ga_home,
        goals_for_away: gf_away,
        goals_against_away: ga_away,
        a_win_pct: a_wins as f64 / nf,
        b_win_pct: b_wins as f64 / nf,
        score: head_to_head_score(n, btts_pct, gf_home, ga_home, gf_away, ga_away),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormKey {
    pub team_id: TeamId,
    pub competition_id: CompetitionId,
    pub season: u32,
    pub side: SideFilter,
}

impl From<&FormQuery> for FormKey {
    fn from(q: &FormQuery) -> Self {
        Self {
            team_id: q.team_id,
            competition_id: q.competition_id,
            season: q.season,
            side: q.side,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadToHeadKey {
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub window: usize,
}

/// Populate-once map that lives for one scoring run.
///
/// Concurrent misses on the same key may both compute; the last write wins.
/// Failed computations are not memoized.
#[derive(Debug)]
pub struct RunCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for RunCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> RunCache<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type FormCache = RunCache<FormKey, TeamForm>;
pub type HeadToHeadCache = RunCache<HeadToHeadKey, HeadToHead>;

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        FormCache, FormKey, FormQuery, SideFilter, TeamForm, build_head_to_head, build_team_form,
        head_to_head_score,
    };
    use crate::fixture::{MatchRecord, MatchStatus};

    fn record(id: u64, day: i64, home: u32, away: u32, hg: u8, ag: u8) -> MatchRecord {
        MatchRecord {
            id,
            competition_id: 39,
            season: 2025,
            kickoff: Utc.with_ymd_and_hms(2025, 8, 1, 15, 0, 0).unwrap() + Duration::days(day),
            status: MatchStatus::Finished,
            home_id: home,
            away_id: away,
            home_goals: Some(hg),
            away_goals: Some(ag),
            home_xg: None,
            away_xg: None,
        }
    }

    fn query(team_id: u32, side: SideFilter) -> FormQuery {
        FormQuery {
            team_id,
            competition_id: 39,
            season: 2025,
            side,
            reference: None,
        }
    }

    #[test]
    fn empty_history_returns_neutral_defaults() {
        let form = build_team_form(&[], &query(1, SideFilter::Overall));
        assert_eq!(form, TeamForm::empty());
        assert!((form.goals_for - 1.2).abs() < 1e-12);
        assert!((form.goals_against - 1.1).abs() < 1e-12);
        assert!(form.win_rate().is_none());
    }

    #[test]
    fn form_counts_results_and_proxies_xg_with_goals() {
        let history = vec![
            record(1, 0, 1, 2, 2, 0),
            record(2, 7, 3, 1, 1, 1),
            record(3, 14, 1, 4, 0, 1),
        ];
        let form = build_team_form(&history, &query(1, SideFilter::Overall));
        assert_eq!((form.matches, form.wins, form.draws, form.losses), (3, 1, 1, 1));
        assert!((form.goals_for - 1.0).abs() < 1e-12);
        assert!((form.goals_against - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(form.xg_for, form.goals_for);

        let home_only = build_team_form(&history, &query(1, SideFilter::Home));
        assert_eq!(home_only.matches, 2);
    }

    #[test]
    fn partial_xg_coverage_averages_over_every_match() {
        let mut history: Vec<MatchRecord> =
            (0..4).map(|i| record(i + 1, i as i64 * 7, 1, 2, 3, 0)).collect();
        for m in history.iter_mut().take(2) {
            m.home_xg = Some(2.0);
            m.away_xg = Some(1.0);
        }
        let form = build_team_form(&history, &query(1, SideFilter::Overall));
        assert_eq!(form.matches, 4);
        assert!((form.xg_for - 1.0).abs() < 1e-12);
        assert!((form.xg_against - 0.5).abs() < 1e-12);
        assert!((form.goals_for - 3.0).abs() < 1e-12);
    }

    #[test]
    fn form_ignores_matches_after_reference() {
        let history = vec![record(1, 0, 1, 2, 2, 0), record(2, 10, 1, 3, 0, 4)];
        let mut q = query(1, SideFilter::Overall);
        q.reference = Some(history[0].kickoff + Duration::days(1));
        let form = build_team_form(&history, &q);
        assert_eq!(form.matches, 1);
        assert_eq!(form.wins, 1);
    }

    #[test]
    fn form_skips_unfinished_and_other_competitions() {
        let mut live = record(1, 0, 1, 2, 1, 0);
        live.status = MatchStatus::InPlay;
        let mut cup = record(2, 1, 1, 2, 5, 0);
        cup.competition_id = 2;
        let form = build_team_form(&[live, cup], &query(1, SideFilter::Overall));
        assert!(form.is_empty());
    }

    #[test]
    fn h2h_small_sample_uses_plain_average() {
        let meetings = vec![record(1, 0, 1, 2, 2, 1), record(2, 30, 2, 1, 1, 1)];
        let h2h = build_head_to_head(1, 2, &meetings, 10);
        assert_eq!(h2h.matches, 2);
        let expected = (h2h.goals_for_home
            + h2h.goals_for_away
            + h2h.goals_against_home
            + h2h.goals_against_away)
            / 4.0;
        assert!((h2h.score - expected).abs() < 1e-12);
        assert!((h2h.btts_pct - 100.0).abs() < 1e-12);
        assert!((h2h.a_win_pct - 0.5).abs() < 1e-12);
        assert_eq!(h2h.b_win_pct, 0.0);
    }

    #[test]
    fn h2h_weighted_branch_stays_in_range() {
        let meetings = vec![
            record(1, 0, 1, 2, 1, 0),
            record(2, 30, 2, 1, 0, 0),
            record(3, 60, 1, 2, 2, 2),
            record(4, 90, 2, 1, 3, 1),
        ];
        let h2h = build_head_to_head(1, 2, &meetings, 10);
        assert_eq!(h2h.matches, 4);
        let expected = head_to_head_score(
            4,
            h2h.btts_pct,
            h2h.goals_for_home,
            h2h.goals_against_home,
            h2h.goals_for_away,
            h2h.goals_against_away,
        );
        assert!((h2h.score - expected).abs() < 1e-12);
        assert!(h2h.score >= 0.0 && h2h.score <= 2.5);
        assert_eq!(build_head_to_head(1, 2, &meetings, 2).matches, 2);
    }

    #[test]
    fn cache_memoizes_successes_only() {
        let cache = FormCache::new();
        let key = FormKey {
            team_id: 1,
            competition_id: 39,
            season: 2025,
            side: SideFilter::Home,
        };
        let failed: Result<TeamForm, &str> = cache.get_or_try_insert_with(key, || Err("down"));
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let mut calls = 0;
        for _ in 0..3 {
            let got: Result<TeamForm, &str> = cache.get_or_try_insert_with(key, || {
                calls += 1;
                Ok(TeamForm::empty())
            });
            assert!(got.is_ok());
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }
}
