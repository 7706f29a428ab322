//! Calibration pass over the settled signal corpus.
//!
//! One aggregation per (bet type, optional competition) produces a
//! confidence histogram. The threshold search, the bucket table and the
//! correction factor are all read off that single table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::scorer::Thresholds;
use crate::signal::{BetType, OutcomeLabel, SignalRecord};

pub const MIN_FACTOR: f64 = 0.50;
pub const MAX_FACTOR: f64 = 1.50;

const SCAN_FROM: u32 = 60;
const SCAN_TO: u32 = 95;
const MIN_VOLUME_SHARE: f64 = 0.15;
const MIN_GAIN_PCT: f64 = 0.5;
const FALLBACK_THRESHOLD: u32 = 70;
const SIGNIFICANT_BUCKET_COUNT: usize = 25;
const SIGNIFICANT_BUCKET_SHARE_PCT: f64 = 10.0;
const SMALL_SAMPLE: usize = 25;

/// Per-type multiplicative correction. Types without an entry are not
/// corrected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CalibrationFactors(BTreeMap<BetType, f64>);

impl CalibrationFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factor(&self, bet_type: BetType) -> f64 {
        self.get(bet_type).unwrap_or(1.0)
    }

    pub fn get(&self, bet_type: BetType) -> Option<f64> {
        self.0.get(&bet_type).copied()
    }

    pub fn set(&mut self, bet_type: BetType, factor: f64) {
        self.0.insert(bet_type, factor.clamp(MIN_FACTOR, MAX_FACTOR));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BetType, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// Best thresholds found by the last calibration pass, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OptimalThresholds(BTreeMap<BetType, u32>);

impl OptimalThresholds {
    pub fn get(&self, bet_type: BetType) -> Option<u32> {
        self.0.get(&bet_type).copied()
    }

    pub fn set(&mut self, bet_type: BetType, pct: u32) {
        self.0.insert(bet_type, pct);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces the configured minimum for every type with a stored optimum.
    /// The stored Result optimum already includes any margin.
    pub fn apply_to(&self, thresholds: &mut Thresholds) {
        for (bet_type, pct) in &self.0 {
            thresholds.set(*bet_type, f64::from(*pct) / 100.0);
            if *bet_type == BetType::Result {
                thresholds.result_margin = 0.0;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Bucket {
    #[serde(rename = "<60")]
    Below60,
    #[serde(rename = "60-70")]
    From60,
    #[serde(rename = "70-80")]
    From70,
    #[serde(rename = "80-90")]
    From80,
    #[serde(rename = "90-100")]
    From90,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Below60,
        Bucket::From60,
        Bucket::From70,
        Bucket::From80,
        Bucket::From90,
    ];

    /// Inclusive range of whole confidence percents covered.
    fn range(self) -> (usize, usize) {
        match self {
            Bucket::Below60 => (0, 59),
            Bucket::From60 => (60, 69),
            Bucket::From70 => (70, 79),
            Bucket::From80 => (80, 89),
            Bucket::From90 => (90, 100),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Below60 => "<60",
            Bucket::From60 => "60-70",
            Bucket::From70 => "70-80",
            Bucket::From80 => "80-90",
            Bucket::From90 => "90-100",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStat {
    pub bucket: Bucket,
    pub count: usize,
    pub wins: usize,
    /// Percent.
    pub win_rate: f64,
    /// Share of the type's resolved volume, percent.
    pub share: f64,
}

impl BucketStat {
    fn is_significant(&self) -> bool {
        self.count >= SIGNIFICANT_BUCKET_COUNT || self.share >= SIGNIFICANT_BUCKET_SHARE_PCT
    }

    fn score(&self) -> f64 {
        0.7 * self.win_rate + 0.3 * self.share
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdChoice {
    pub threshold: u32,
    pub win_rate: f64,
    pub volume: usize,
    /// No candidate beat the global rate by enough; this is the default.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestZone {
    pub bucket: Bucket,
    pub win_rate: f64,
    pub volume: usize,
    pub small_sample: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub bet_type: BetType,
    pub total: usize,
    pub wins: usize,
    pub win_rate: f64,
    /// Mean confidence (percent) over winning signals.
    pub mean_confidence_winners: f64,
    pub factor: Option<f64>,
    pub optimal: ThresholdChoice,
    pub buckets: Vec<BucketStat>,
    pub best_bucket: Option<Bucket>,
    pub best_zone: Option<BestZone>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub by_type: Vec<TypeSummary>,
    pub by_competition: BTreeMap<String, Vec<TypeSummary>>,
    pub factors: CalibrationFactors,
    pub thresholds: OptimalThresholds,
    /// Types with no resolved signals at all.
    pub missing: Vec<BetType>,
}

/// Win counts per whole confidence percent.
#[derive(Debug, Clone)]
struct ConfidenceTable {
    counts: [usize; 101],
    wins: [usize; 101],
    total: usize,
    total_wins: usize,
    winner_confidence_sum: f64,
}

impl ConfidenceTable {
    fn new() -> Self {
        Self {
            counts: [0; 101],
            wins: [0; 101],
            total: 0,
            total_wins: 0,
            winner_confidence_sum: 0.0,
        }
    }

    fn add(&mut self, confidence_pct: f64, won: bool) {
        // 0.7 * 100 lands a hair under 70; nudge before flooring.
        let idx = ((confidence_pct + 1e-9).floor().max(0.0) as usize).min(100);
        self.counts[idx] += 1;
        self.total += 1;
        if won {
            self.wins[idx] += 1;
            self.total_wins += 1;
            self.winner_confidence_sum += confidence_pct;
        }
    }

    fn span(&self, lo: usize, hi: usize) -> (usize, usize) {
        let n = self.counts[lo..=hi].iter().sum();
        let w = self.wins[lo..=hi].iter().sum();
        (n, w)
    }

    fn win_rate(&self) -> f64 {
        rate_pct(self.total_wins, self.total)
    }

    fn mean_confidence_winners(&self) -> f64 {
        if self.total_wins == 0 {
            return 0.0;
        }
        self.winner_confidence_sum / self.total_wins as f64
    }
}

fn rate_pct(wins: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    wins as f64 / n as f64 * 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn compute_factor(table: &ConfidenceTable) -> Option<f64> {
    let mean = table.mean_confidence_winners();
    if table.total == 0 || mean <= 0.0 {
        return None;
    }
    Some(round3(table.win_rate() / mean).clamp(MIN_FACTOR, MAX_FACTOR))
}

fn search_threshold(table: &ConfidenceTable) -> ThresholdChoice {
    let global = table.win_rate();
    let min_volume = MIN_VOLUME_SHARE * table.total as f64;
    let mut best: Option<ThresholdChoice> = None;

    for threshold in SCAN_FROM..=SCAN_TO {
        let (n, w) = table.span(threshold as usize, 100);
        if n == 0 || (n as f64) < min_volume {
            continue;
        }
        let rate = rate_pct(w, n);
        let beats_best = best.is_none_or(|b| rate > b.win_rate);
        if rate > global + MIN_GAIN_PCT && beats_best {
            best = Some(ThresholdChoice {
                threshold,
                win_rate: rate,
                volume: n,
                fallback: false,
            });
        }
    }

    best.unwrap_or(ThresholdChoice {
        threshold: FALLBACK_THRESHOLD,
        win_rate: global,
        volume: table.total,
        fallback: true,
    })
}

fn bucket_stats(table: &ConfidenceTable) -> Vec<BucketStat> {
    Bucket::ALL
        .into_iter()
        .map(|bucket| {
            let (lo, hi) = bucket.range();
            let (count, wins) = table.span(lo, hi);
            BucketStat {
                bucket,
                count,
                wins,
                win_rate: rate_pct(wins, count),
                share: rate_pct(count, table.total),
            }
        })
        .collect()
}

fn best_bucket(buckets: &[BucketStat]) -> Option<Bucket> {
    buckets
        .iter()
        .filter(|b| b.count > 0 && b.is_significant())
        .max_by(|a, b| a.score().total_cmp(&b.score()))
        .map(|b| b.bucket)
}

fn best_zone(buckets: &[BucketStat]) -> Option<BestZone> {
    let populated: Vec<&BucketStat> = buckets.iter().filter(|b| b.count > 0).collect();
    let significant: Vec<&BucketStat> = populated
        .iter()
        .copied()
        .filter(|b| b.is_significant())
        .collect();
    let pool = if significant.is_empty() {
        populated
    } else {
        significant
    };

    let by_volume = |min_rate: f64| {
        pool.iter()
            .copied()
            .filter(|b| b.win_rate >= min_rate)
            .max_by_key(|b| b.count)
    };
    let chosen = by_volume(90.0)
        .or_else(|| by_volume(85.0))
        .or_else(|| {
            pool.iter()
                .copied()
                .max_by(|a, b| a.win_rate.total_cmp(&b.win_rate))
        })?;

    Some(BestZone {
        bucket: chosen.bucket,
        win_rate: chosen.win_rate,
        volume: chosen.count,
        small_sample: chosen.count < SMALL_SAMPLE,
    })
}

fn summarize(bet_type: BetType, table: &ConfidenceTable) -> TypeSummary {
    let buckets = bucket_stats(table);
    TypeSummary {
        bet_type,
        total: table.total,
        wins: table.total_wins,
        win_rate: table.win_rate(),
        mean_confidence_winners: table.mean_confidence_winners(),
        factor: compute_factor(table),
        optimal: search_threshold(table),
        best_bucket: best_bucket(&buckets),
        best_zone: best_zone(&buckets),
        buckets,
    }
}

fn tables_by_type<'a>(
    records: impl Iterator<Item = &'a SignalRecord>,
) -> BTreeMap<BetType, ConfidenceTable> {
    let mut out: BTreeMap<BetType, ConfidenceTable> = BTreeMap::new();
    for r in records {
        let won = match r.outcome {
            OutcomeLabel::Correct => true,
            OutcomeLabel::Wrong => false,
            OutcomeLabel::Pending => continue,
        };
        if !r.confidence.is_finite() {
            continue;
        }
        out.entry(r.bet_type)
            .or_insert_with(ConfidenceTable::new)
            .add(r.confidence * 100.0, won);
    }
    out
}

/// Recomputes factors and thresholds from scratch. Pending records are
/// ignored; identical input always yields an identical report.
pub fn calibrate(records: &[SignalRecord]) -> CalibrationReport {
    let tables = tables_by_type(records.iter());

    let mut report = CalibrationReport::default();
    for bet_type in BetType::ALL {
        let Some(table) = tables.get(&bet_type) else {
            report.missing.push(bet_type);
            continue;
        };
        let summary = summarize(bet_type, table);
        if let Some(f) = summary.factor {
            report.factors.set(bet_type, f);
        }
        if !summary.optimal.fallback {
            report.thresholds.set(bet_type, summary.optimal.threshold);
        }
        report.by_type.push(summary);
    }

    let mut competitions: BTreeMap<&str, Vec<&SignalRecord>> = BTreeMap::new();
    for r in records {
        competitions.entry(r.competition.as_str()).or_default().push(r);
    }
    for (name, rows) in competitions {
        let summaries: Vec<TypeSummary> = tables_by_type(rows.into_iter())
            .iter()
            .map(|(bet_type, table)| summarize(*bet_type, table))
            .collect();
        if !summaries.is_empty() {
            report.by_competition.insert(name.to_string(), summaries);
        }
    }

    for bet_type in &report.missing {
        warn!(bet_type = bet_type.key(), "no resolved signals; factor stays neutral");
    }
    info!(
        types = report.by_type.len(),
        competitions = report.by_competition.len(),
        factors = report.factors.iter().count(),
        "calibration pass complete"
    );
    report
}

fn read_flat_map(path: &Path) -> Option<BTreeMap<String, f64>> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<BTreeMap<String, f64>>(&raw) {
        Ok(map) => Some(map),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable calibration file");
            None
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).with_context(|| format!("serialize {what}"))?;
    fs::write(&tmp, json).with_context(|| format!("write {what}"))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {what}"))?;
    Ok(())
}

/// Missing or corrupt files load as no correction at all.
pub fn load_factors(path: &Path) -> CalibrationFactors {
    let mut out = CalibrationFactors::new();
    for (key, value) in read_flat_map(path).unwrap_or_default() {
        let Ok(bet_type) = key.parse::<BetType>() else {
            warn!(key = %key, "unknown bet type in calibration file");
            continue;
        };
        if value.is_finite() && value > 0.0 {
            out.set(bet_type, value);
        }
    }
    out
}

pub fn save_factors(path: &Path, factors: &CalibrationFactors) -> Result<()> {
    write_json_atomic(path, factors, "calibration factors")
}

pub fn thresholds_path(factors_path: &Path) -> std::path::PathBuf {
    factors_path.with_file_name("thresholds.json")
}

pub fn load_thresholds(path: &Path) -> OptimalThresholds {
    let mut out = OptimalThresholds::default();
    for (key, value) in read_flat_map(path).unwrap_or_default() {
        if let Ok(bet_type) = key.parse::<BetType>()
            && value.is_finite()
            && (f64::from(SCAN_FROM)..=f64::from(SCAN_TO)).contains(&value)
        {
            out.set(bet_type, value.round() as u32);
        }
    }
    out
}

pub fn save_thresholds(path: &Path, thresholds: &OptimalThresholds) -> Result<()> {
    write_json_atomic(path, thresholds, "optimal thresholds")
}

/// Persists factors and thresholds next to each other. The scorer only reads
/// global files, so a run restricted to one competition is never written;
/// returns whether anything was saved.
pub fn save_report(
    factors_path: &Path,
    report: &CalibrationReport,
    competition: Option<&str>,
) -> Result<bool> {
    if let Some(name) = competition {
        warn!(competition = name, "scoped calibration is report-only; not saved");
        return Ok(false);
    }
    save_factors(factors_path, &report.factors)?;
    save_thresholds(&thresholds_path(factors_path), &report.thresholds)?;
    info!(path = %factors_path.display(), "calibration saved");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{
        Bucket, CalibrationFactors, ConfidenceTable, best_zone, bucket_stats, calibrate,
        search_threshold,
    };
    use crate::signal::{BetType, OutcomeLabel, SignalRecord};

    fn record(bet_type: BetType, confidence: f64, won: bool) -> SignalRecord {
        SignalRecord {
            bet_type,
            competition: "Premier League".to_string(),
            confidence,
            outcome: if won {
                OutcomeLabel::Correct
            } else {
                OutcomeLabel::Wrong
            },
        }
    }

    #[test]
    fn factor_defaults_to_neutral() {
        let f = CalibrationFactors::new();
        assert_eq!(f.factor(BetType::Btts), 1.0);
    }

    #[test]
    fn factor_is_clamped() {
        let mut f = CalibrationFactors::new();
        f.set(BetType::Result, 3.0);
        assert_eq!(f.factor(BetType::Result), 1.5);
    }

    #[test]
    fn factor_is_rate_over_winner_confidence() {
        let mut records = Vec::new();
        for _ in 0..6 {
            records.push(record(BetType::Over15, 0.80, true));
        }
        for _ in 0..4 {
            records.push(record(BetType::Over15, 0.70, false));
        }
        let report = calibrate(&records);
        // 60% observed against 80% mean confidence.
        assert_eq!(report.factors.get(BetType::Over15), Some(0.75));
        assert!(report.missing.contains(&BetType::Btts));
        assert_eq!(report.factors.get(BetType::Btts), None);
    }

    #[test]
    fn pending_records_are_ignored() {
        let mut r = record(BetType::Result, 0.9, true);
        r.outcome = OutcomeLabel::Pending;
        let report = calibrate(&[r]);
        assert!(report.by_type.is_empty());
        assert!(report.factors.is_empty());
    }

    #[test]
    fn threshold_needs_volume() {
        let mut table = ConfidenceTable::new();
        // 2 perfect picks at 95 against 198 at 65 winning 75%.
        table.add(95.0, true);
        table.add(95.0, true);
        for i in 0..198 {
            table.add(65.0, i % 4 != 0);
        }
        let choice = search_threshold(&table);
        assert!(choice.fallback);
        assert_eq!(choice.threshold, 70);
        assert_eq!(choice.volume, 200);
    }

    #[test]
    fn threshold_picks_best_qualifying_rate() {
        let mut table = ConfidenceTable::new();
        for i in 0..50 {
            table.add(62.0, i % 2 == 0);
        }
        for i in 0..50 {
            table.add(78.0, i % 5 != 0);
        }
        let choice = search_threshold(&table);
        assert!(!choice.fallback);
        assert_eq!(choice.threshold, 63);
        assert!((choice.win_rate - 80.0).abs() < 1e-9);
        assert_eq!(choice.volume, 50);
    }

    #[test]
    fn best_zone_prefers_high_rate_with_volume() {
        let mut table = ConfidenceTable::new();
        for i in 0..40 {
            table.add(85.0, i % 10 != 0);
        }
        for _ in 0..3 {
            table.add(95.0, true);
        }
        for i in 0..57 {
            table.add(65.0, i % 2 == 0);
        }
        let buckets = bucket_stats(&table);
        let zone = best_zone(&buckets).unwrap();
        assert_eq!(zone.bucket, Bucket::From80);
        assert_eq!(zone.volume, 40);
        assert!(!zone.small_sample);
    }

    #[test]
    fn calibration_is_idempotent() {
        let records: Vec<SignalRecord> = (0..120)
            .map(|i| record(BetType::Btts, 0.6 + (i % 35) as f64 / 100.0, i % 3 != 0))
            .collect();
        assert_eq!(calibrate(&records), calibrate(&records));
    }
}
