use anyhow::Result;
use tracing::info;

use matchday_signals::calibration::{self, TypeSummary};
use matchday_signals::config::{self, AppConfig};
use matchday_signals::store;
use matchday_signals::synthetic;

const SYNTHETIC_CORPUS: usize = 2_000;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let cfg = AppConfig::from_env();

    let competition = parse_string_arg("--competition");
    let records = if has_flag("--synthetic") {
        let seed = parse_u64_arg("--seed").unwrap_or(42);
        synthetic::synthetic_corpus(seed, SYNTHETIC_CORPUS)
    } else {
        let conn = store::open_db(&cfg.db_path)?;
        store::load_resolved(&conn, competition.as_deref())?
    };
    info!(records = records.len(), "loaded settled signals");

    let report = calibration::calibrate(&records);

    println!("Calibration over {} settled signals", records.len());
    for summary in &report.by_type {
        print_summary(summary, "");
    }
    for bet_type in &report.missing {
        println!("{:<14} no settled signals; factor stays 1.0", bet_type.label());
    }

    if has_flag("--by-competition") {
        for (name, summaries) in &report.by_competition {
            println!();
            println!("{name}");
            for summary in summaries {
                print_summary(summary, "  ");
            }
        }
    }

    if has_flag("--dry-run") {
        info!("dry run; calibration not persisted");
        return Ok(());
    }
    if !calibration::save_report(&cfg.calibration_path, &report, competition.as_deref())? {
        println!("Scoped to one competition; existing calibration left untouched");
    }
    Ok(())
}

fn print_summary(s: &TypeSummary, indent: &str) {
    let factor = s
        .factor
        .map(|f| format!("{f:.3}"))
        .unwrap_or_else(|| "-".to_string());
    let threshold = if s.optimal.fallback {
        format!("{} (default)", s.optimal.threshold)
    } else {
        format!("{}", s.optimal.threshold)
    };
    println!(
        "{indent}{:<14} n={:<5} win={:>5.1}% conf(winners)={:>5.1}% factor={factor} threshold={threshold} ({:.1}% over {})",
        s.bet_type.label(),
        s.total,
        s.win_rate,
        s.mean_confidence_winners,
        s.optimal.win_rate,
        s.optimal.volume,
    );
    for b in s.buckets.iter().filter(|b| b.count > 0) {
        let marker = if s.best_bucket == Some(b.bucket) { "<- best" } else { "" };
        println!(
            "{indent}    {:<7} n={:<5} win={:>5.1}% share={:>5.1}% {marker}",
            b.bucket.label(),
            b.count,
            b.win_rate,
            b.share
        );
    }
    if let Some(zone) = s.best_zone {
        let caveat = if zone.small_sample { " (small sample)" } else { "" };
        println!(
            "{indent}    best zone {} at {:.1}% over {}{caveat}",
            zone.bucket.label(),
            zone.win_rate,
            zone.volume
        );
    }
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
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
