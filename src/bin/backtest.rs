use std::fs;
use std::path::PathBuf;

use gridiron_alpha::alpha_signals::CompositeSignalProvider;
use gridiron_alpha::backtest;
use gridiron_alpha::config::Config;
use gridiron_alpha::league::{LeagueContext, validate_league};

fn main() -> anyhow::Result<()> {
    let fixture = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/league_snapshot.json"));
    let config_path = std::env::args().nth(2).map(PathBuf::from);

    let raw = fs::read_to_string(&fixture)?;
    let league: LeagueContext = serde_json::from_str(&raw)?;
    validate_league(&league)?;

    let config = match config_path {
        Some(path) => gridiron_alpha::config::load_config(&path)?,
        None => Config::default(),
    };

    // This binary is intentionally simple: it replays completed weeks from
    // one saved league snapshot and prints the scores. Without a snapshot
    // store the provider degrades to league-only signals, which is exactly
    // the offline-tuning workflow it exists for.
    let mut provider = CompositeSignalProvider::new(config.alpha.clone(), config.runtime.clone());

    let completed: Vec<u32> = (1..league.current_week).collect();
    let report = backtest::run_backtest(&league, &mut provider, &config.alpha, completed);

    println!(
        "weeks={} baseline_mae={:.3} alpha_mae={:.3} lift={:+.3}",
        report.weeks.len(),
        report.baseline_mae,
        report.alpha_mae,
        report.alpha_lift
    );
    println!(
        "win-prob: samples={} brier={:.4} log_loss={:.4} accuracy={:.3}",
        report.win_prob_metrics.samples,
        report.win_prob_metrics.brier,
        report.win_prob_metrics.log_loss,
        report.win_prob_metrics.accuracy
    );
    for bin in &report.reliability {
        if bin.count > 0 {
            println!(
                "  [{:.1}-{:.1}) n={} avg_pred={:.3} actual={:.3}",
                bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
            );
        }
    }
    for warning in &report.warnings {
        eprintln!("[WARN] {warning}");
    }
    for week in &report.weeks {
        println!(
            "  week {:>2}: n={:<3} baseline={:.3} alpha={:.3}{}",
            week.week,
            week.samples,
            week.baseline_mae,
            week.alpha_mae,
            if week.degraded { " (degraded)" } else { "" }
        );
    }

    Ok(())
}
