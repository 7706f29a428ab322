use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::evaluate::settle;
use crate::fixture::{Fixture, FixtureId, Score};
use crate::pipeline::RunSummary;
use crate::signal::{BetType, OutcomeLabel, Pick, Signal, SignalRecord};

/// A stored signal that still waits for its match to finish.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignal {
    pub signal_id: i64,
    pub fixture_id: FixtureId,
    pub kickoff: DateTime<Utc>,
    pub pick: Pick,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS signals (
            signal_id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id INTEGER NOT NULL,
            competition TEXT NOT NULL,
            kickoff TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            bet_type TEXT NOT NULL,
            pick TEXT NOT NULL,
            suggestion TEXT NOT NULL,
            confidence REAL NOT NULL,
            odd REAL NULL,
            tier TEXT NOT NULL,
            source TEXT NOT NULL,
            actionable INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            created_at TEXT NOT NULL,
            settled_at TEXT NULL,
            UNIQUE(fixture_id, bet_type, pick)
        );
        CREATE INDEX IF NOT EXISTS idx_signals_outcome ON signals(outcome);
        CREATE INDEX IF NOT EXISTS idx_signals_competition ON signals(competition);

        CREATE TABLE IF NOT EXISTS scoring_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_date TEXT NULL,
            recorded_at TEXT NOT NULL,
            fixtures_seen INTEGER NOT NULL,
            scored INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            low_confidence INTEGER NOT NULL,
            signals_total INTEGER NOT NULL,
            summary_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Inserts new signals for one fixture. Signals already stored for the
/// same (fixture, bet type, pick) are left untouched, so re-running a day
/// never duplicates or overwrites. Returns the number inserted.
pub fn append_signals(conn: &mut Connection, fixture: &Fixture, signals: &[Signal]) -> Result<usize> {
    if signals.is_empty() {
        return Ok(0);
    }
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin signal transaction")?;
    let mut inserted = 0usize;
    for s in signals {
        inserted += tx
            .execute(
                r#"
                INSERT OR IGNORE INTO signals (
                    fixture_id, competition, kickoff, home_team, away_team,
                    bet_type, pick, suggestion, confidence, odd,
                    tier, source, actionable, outcome, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15
                )
                "#,
                params![
                    fixture.id as i64,
                    fixture.competition.name,
                    fixture.kickoff.to_rfc3339(),
                    fixture.home.name,
                    fixture.away.name,
                    s.bet_type().key(),
                    s.pick.key(),
                    s.suggestion,
                    s.confidence,
                    s.odd,
                    s.tier.key(),
                    s.source,
                    s.actionable as i64,
                    s.outcome.key(),
                    now,
                ],
            )
            .context("insert signal")?;
    }
    tx.commit().context("commit signal transaction")?;
    Ok(inserted)
}

pub fn load_pending(conn: &Connection) -> Result<Vec<PendingSignal>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT signal_id, fixture_id, kickoff, pick
            FROM signals
            WHERE outcome = 'pending'
            ORDER BY kickoff ASC, signal_id ASC
            "#,
        )
        .context("prepare pending query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .context("query pending signals")?;

    let mut out = Vec::new();
    for row in rows {
        let (signal_id, fixture_id, kickoff, pick) = row.context("decode pending row")?;
        let kickoff = DateTime::parse_from_rfc3339(&kickoff)
            .with_context(|| format!("signal {signal_id}: bad kickoff {kickoff}"))?
            .with_timezone(&Utc);
        let pick = pick
            .parse::<Pick>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("signal {signal_id}"))?;
        out.push(PendingSignal {
            signal_id,
            fixture_id: fixture_id as FixtureId,
            kickoff,
            pick,
        });
    }
    Ok(out)
}

/// Writes a resolved label. Only pending rows are touched; returns whether
/// the row changed.
pub fn record_outcome(conn: &Connection, signal_id: i64, outcome: OutcomeLabel) -> Result<bool> {
    if !outcome.is_resolved() {
        return Ok(false);
    }
    let changed = conn
        .execute(
            "UPDATE signals SET outcome = ?1, settled_at = ?2
             WHERE signal_id = ?3 AND outcome = 'pending'",
            params![outcome.key(), Utc::now().to_rfc3339(), signal_id],
        )
        .context("update signal outcome")?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleCounts {
    pub settled: usize,
    pub pending: usize,
}

/// Settles pending rows against the final scores `score_of` knows about and
/// writes back the labels that resolved.
pub fn settle_pending<F>(conn: &Connection, rows: &[PendingSignal], score_of: F) -> Result<SettleCounts>
where
    F: Fn(FixtureId) -> Option<Score>,
{
    let mut counts = SettleCounts::default();
    for row in rows {
        let mut outcome = OutcomeLabel::Pending;
        if settle(row.pick, &mut outcome, score_of(row.fixture_id))
            && record_outcome(conn, row.signal_id, outcome)?
        {
            counts.settled += 1;
        } else {
            counts.pending += 1;
        }
    }
    Ok(counts)
}

pub fn outcome_of(conn: &Connection, signal_id: i64) -> Result<Option<OutcomeLabel>> {
    let raw = conn
        .query_row(
            "SELECT outcome FROM signals WHERE signal_id = ?1",
            params![signal_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("query signal outcome")?;
    raw.map(|s| s.parse::<OutcomeLabel>().map_err(anyhow::Error::msg))
        .transpose()
}

/// Settled signals, optionally restricted to one competition.
pub fn load_resolved(conn: &Connection, competition: Option<&str>) -> Result<Vec<SignalRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT bet_type, competition, confidence, outcome
            FROM signals
            WHERE outcome != 'pending'
              AND (?1 IS NULL OR competition = ?1)
            ORDER BY signal_id ASC
            "#,
        )
        .context("prepare resolved query")?;
    let rows = stmt
        .query_map(params![competition], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .context("query resolved signals")?;

    let mut out = Vec::new();
    for row in rows {
        let (bet_type, competition, confidence, outcome) = row.context("decode resolved row")?;
        out.push(SignalRecord {
            bet_type: bet_type.parse::<BetType>().map_err(anyhow::Error::msg)?,
            competition,
            confidence,
            outcome: outcome.parse::<OutcomeLabel>().map_err(anyhow::Error::msg)?,
        });
    }
    Ok(out)
}

pub fn record_run(conn: &Connection, summary: &RunSummary) -> Result<i64> {
    let summary_json = serde_json::to_string(summary).context("serialize run summary")?;
    conn.execute(
        r#"
        INSERT INTO scoring_runs (
            run_date, recorded_at, fixtures_seen, scored, failed,
            low_confidence, signals_total, summary_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            summary.date.map(|d| d.to_string()),
            Utc::now().to_rfc3339(),
            summary.fixtures_seen as i64,
            summary.scored as i64,
            summary.failed as i64,
            summary.low_confidence as i64,
            summary.signals_total() as i64,
            summary_json,
        ],
    )
    .context("insert scoring run")?;
    Ok(conn.last_insert_rowid())
}
