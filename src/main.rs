use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use matchday_signals::calibration;
use matchday_signals::config::{self, AppConfig};
use matchday_signals::pipeline::{FixtureReport, Pipeline, Sources, build_pool};
use matchday_signals::providers::Snapshot;
use matchday_signals::signal::ConfidenceTier;
use matchday_signals::store;
use matchday_signals::synthetic;

const DEFAULT_SEED: u64 = 42;
const SYNTHETIC_FIXTURES: usize = 36;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let cfg = AppConfig::from_env();

    let date = parse_date_arg("--date").unwrap_or_else(|| Utc::now().date_naive());
    let seed = parse_u64_arg("--seed").unwrap_or(DEFAULT_SEED);
    let dry_run = has_flag("--dry-run");

    let snapshot = if has_flag("--synthetic") {
        synthetic::synthetic_snapshot(date, seed, SYNTHETIC_FIXTURES)
    } else {
        match Snapshot::load_for(&cfg.snapshot_dir, date) {
            Ok(s) => s,
            Err(err) => {
                warn!(%date, dir = %cfg.snapshot_dir.display(), error = %err, "no snapshot; nothing to score");
                Snapshot {
                    date: Some(date),
                    ..Snapshot::default()
                }
            }
        }
    };

    let factors = calibration::load_factors(&cfg.calibration_path);
    let mut scoring = cfg.scoring;
    if cfg.use_optimal_thresholds {
        let optimal =
            calibration::load_thresholds(&calibration::thresholds_path(&cfg.calibration_path));
        optimal.apply_to(&mut scoring.thresholds);
    }

    let pool = build_pool(cfg.threads);
    let mut pipeline = Pipeline::new(Sources::single(&snapshot), &factors, scoring, cfg.h2h_window);
    if has_flag("--all-competitions") {
        pipeline = pipeline.all_competitions();
    }
    let output = pipeline.run(date, pool.as_ref());

    print_reports(&output.reports);
    let s = &output.summary;
    println!();
    println!(
        "{date}: fixtures {} (filtered {}), scored {}, failed {}, low-data {}, signals {}",
        s.fixtures_seen,
        s.filtered_out,
        s.scored,
        s.failed,
        s.low_confidence,
        s.signals_total()
    );

    if dry_run {
        info!("dry run; nothing persisted");
        return Ok(());
    }
    let mut conn = store::open_db(&cfg.db_path)?;
    let mut inserted = 0usize;
    for report in &output.reports {
        inserted += store::append_signals(&mut conn, &report.fixture, &report.signals)?;
    }
    store::record_run(&conn, &output.summary)?;
    info!(inserted, db = %cfg.db_path.display(), "signals stored");
    Ok(())
}

fn print_reports(reports: &[FixtureReport]) {
    for report in reports {
        let f = &report.fixture;
        if report.signals.is_empty() && report.error.is_none() {
            continue;
        }
        println!(
            "{} {:<24} {}",
            f.kickoff.format("%H:%M"),
            f.competition.name,
            f.label()
        );
        if let Some(err) = &report.error {
            println!("    skipped: {err}");
            continue;
        }
        for s in &report.signals {
            let star = match s.tier {
                ConfidenceTier::VeryConservative => "**",
                ConfidenceTier::Conservative => "* ",
            };
            let note = if s.actionable { "" } else { "  (informational)" };
            println!(
                "    {star} {:<14} {:<32} @{:.2}  {:>5.1}%{note}",
                s.bet_type().label(),
                s.suggestion,
                s.display_odd(),
                s.confidence_pct()
            );
        }
    }
}

fn parse_date_arg(name: &str) -> Option<NaiveDate> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(d) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        {
            return Some(d);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(d) = NaiveDate::parse_from_str(next.trim(), "%Y-%m-%d")
        {
            return Some(d);
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
