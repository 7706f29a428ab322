use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::form::DEFAULT_H2H_WINDOW;
use crate::scorer::ScoringConfig;

const APP_DIR: &str = "matchday_signals";
const DB_FILE: &str = "signals.sqlite";
const CALIBRATION_FILE: &str = "calibration.json";
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_LOG_FILTER: &str = "info,matchday_signals=info";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub calibration_path: PathBuf,
    pub snapshot_dir: PathBuf,
    /// `None` runs on rayon's global pool.
    pub threads: Option<usize>,
    pub scoring: ScoringConfig,
    pub h2h_window: usize,
    pub use_optimal_thresholds: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = app_data_dir().unwrap_or_else(|| PathBuf::from("."));
        let db_path = env_path("SIGNALS_DB_PATH").unwrap_or_else(|| data_dir.join(DB_FILE));
        let calibration_path = env_path("CALIBRATION_PATH").unwrap_or_else(|| {
            db_path
                .parent()
                .map(|p| p.join(CALIBRATION_FILE))
                .unwrap_or_else(|| PathBuf::from(CALIBRATION_FILE))
        });
        let snapshot_dir =
            env_path("SNAPSHOT_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));

        let threads = env::var("SIGNALS_THREADS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.clamp(1, 64));

        let mut scoring = ScoringConfig::default();
        let t = &mut scoring.thresholds;
        t.result = env_threshold("THRESHOLD_RESULT", t.result);
        t.over_1_5 = env_threshold("THRESHOLD_OVER15", t.over_1_5);
        t.btts = env_threshold("THRESHOLD_BTTS", t.btts);
        t.team_to_score = env_threshold("THRESHOLD_TEAM_TO_SCORE", t.team_to_score);
        t.result_margin = env_f64("RESULT_MARGIN", t.result_margin).clamp(0.0, 0.20);
        scoring.low_data_missing = env::var("LOW_DATA_MISSING_ESTIMATORS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(scoring.low_data_missing)
            .clamp(1, 4);

        let h2h_window = env::var("H2H_WINDOW")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_H2H_WINDOW)
            .clamp(1, 50);

        Self {
            db_path,
            calibration_path,
            snapshot_dir,
            threads,
            scoring,
            h2h_window,
            use_optimal_thresholds: env_bool("USE_OPTIMAL_THRESHOLDS", false),
        }
    }
}

/// `.env.local` wins over `.env`; both are optional.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR),
    )
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_threshold(key: &str, default: f64) -> f64 {
    env_f64(key, default).clamp(0.30, 0.99)
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn env_values_stay_in_range() {
        let cfg = AppConfig::from_env();
        assert!((1..=50).contains(&cfg.h2h_window));
        assert!((1..=4).contains(&cfg.scoring.low_data_missing));
        assert!((0.30..=0.99).contains(&cfg.scoring.thresholds.over_1_5));
        assert!(cfg.threads.is_none_or(|n| (1..=64).contains(&n)));
    }
}
