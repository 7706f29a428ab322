use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use matchday_signals::config::{self, AppConfig};
use matchday_signals::providers::Snapshot;
use matchday_signals::store::{self, PendingSignal};
use matchday_signals::synthetic;

const SYNTHETIC_FIXTURES: usize = 36;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let cfg = AppConfig::from_env();
    let synthetic_seed = has_flag("--synthetic").then(|| parse_u64_arg("--seed").unwrap_or(42));

    let conn = store::open_db(&cfg.db_path)?;
    let pending = store::load_pending(&conn)?;
    info!(pending = pending.len(), "loaded pending signals");

    let mut by_day: BTreeMap<NaiveDate, Vec<PendingSignal>> = BTreeMap::new();
    for p in pending {
        by_day.entry(p.kickoff.date_naive()).or_default().push(p);
    }

    let mut settled = 0usize;
    let mut still_pending = 0usize;
    for (date, signals) in by_day {
        let snapshot = match synthetic_seed {
            Some(seed) => {
                let mut snap = synthetic::synthetic_snapshot(date, seed, SYNTHETIC_FIXTURES);
                synthetic::finish_fixtures(&mut snap, seed);
                snap
            }
            None => match Snapshot::load_for(&cfg.snapshot_dir, date) {
                Ok(s) => s,
                Err(err) => {
                    warn!(%date, error = %err, "no refreshed scores; leaving signals pending");
                    still_pending += signals.len();
                    continue;
                }
            },
        };

        let counts = store::settle_pending(&conn, &signals, |id| {
            snapshot.fixture(id).and_then(|f| f.final_score())
        })?;
        info!(%date, settled = counts.settled, pending = counts.pending, "settled matchday");
        settled += counts.settled;
        still_pending += counts.pending;
    }

    println!("Settled {settled} signals, {still_pending} still pending");
    Ok(())
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
