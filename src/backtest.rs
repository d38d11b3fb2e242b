// Historical evaluation: replay past weeks under as-of cutoffs, score the
// alpha layer against the ESPN baseline, and sweep seeds for an A/B verdict.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alpha_model::{self, PlayerProjection};
use crate::alpha_signals::CompositeSignalProvider;
use crate::calibration::{self, CalibrationBin, Metrics};
use crate::config::{AlphaConfig, SimulationConfig};
use crate::league::{LeagueContext, Player};
use crate::lineup;
use crate::monte_carlo::MonteCarloEngine;
use crate::player_model::PlayerModelStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekReport {
    pub week: u32,
    pub as_of: Option<DateTime<Utc>>,
    pub samples: usize,
    pub baseline_mae: f64,
    pub alpha_mae: f64,
    /// Week replayed without a full leakage cutoff or with missing feeds.
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub weeks: Vec<WeekReport>,
    pub baseline_mae: f64,
    pub alpha_mae: f64,
    /// Positive when the alpha projections were closer to reality.
    pub alpha_lift: f64,
    pub win_prob_metrics: Metrics,
    pub reliability: Vec<CalibrationBin>,
    pub warnings: Vec<String>,
}

/// Replay `weeks` with feeds resolved strictly before each week's kickoff.
///
/// The cutoff for week w is the earliest kickoff among players scheduled
/// that week; per-feed publication lags are applied underneath by the
/// provider. A week with no kickoff on record is still scored but marked
/// degraded.
pub fn run_backtest(
    league: &LeagueContext,
    provider: &mut CompositeSignalProvider,
    alpha: &AlphaConfig,
    weeks: impl IntoIterator<Item = u32>,
) -> BacktestReport {
    let reg_games = league.settings.reg_season_count;
    let mut reports = Vec::new();
    let mut warnings = Vec::new();
    let mut baseline_errors = Vec::new();
    let mut alpha_errors = Vec::new();
    let mut win_predictions = Vec::new();
    let mut win_outcomes = Vec::new();

    for week in weeks {
        let as_of = kickoff_for_week(league, week);
        if as_of.is_none() {
            warnings.push(format!(
                "week {week}: no kickoff on record, replayed without a cutoff"
            ));
            warn!(week, "backtest week has no kickoff; leakage guard weakened");
        }

        let payload = provider.week_payload_with_cutoff(league, week, as_of);
        let degraded_feeds = payload
            .summary
            .quality_flags
            .iter()
            .any(|flag| flag.ends_with(":as_of_miss") || flag.ends_with(":feed_unavailable"));

        let projections = alpha_model::project_players(
            league.all_players(),
            week,
            alpha,
            &payload.adjustments,
            reg_games,
        );

        let mut week_baseline = Vec::new();
        let mut week_alpha = Vec::new();
        let mut actuals = Vec::new();
        for player in league.all_players() {
            let Some(stat) = player.stats.get(&week) else {
                continue;
            };
            let Some(projection) = projections.get(&player.player_id) else {
                continue;
            };
            week_baseline.push(projection.baseline);
            week_alpha.push(projection.blended_mean);
            actuals.push(stat.points);
        }

        let baseline_mae = calibration::mean_absolute_error(&week_baseline, &actuals);
        let alpha_mae = calibration::mean_absolute_error(&week_alpha, &actuals);
        baseline_errors.push((baseline_mae, actuals.len()));
        alpha_errors.push((alpha_mae, actuals.len()));

        // Matchup win probabilities vs realized box scores.
        if let Some(box_scores) = league.box_scores.get(&week) {
            for game in box_scores {
                let Some(p_home) = matchup_win_probability(league, &projections, game.home_team_id, game.away_team_id)
                else {
                    continue;
                };
                win_predictions.push(p_home);
                win_outcomes.push(game.home_score > game.away_score);
            }
        }

        reports.push(WeekReport {
            week,
            as_of,
            samples: actuals.len(),
            baseline_mae,
            alpha_mae,
            degraded: as_of.is_none() || degraded_feeds,
        });
    }

    let baseline_mae = weighted_mae(&baseline_errors);
    let alpha_mae = weighted_mae(&alpha_errors);

    BacktestReport {
        weeks: reports,
        baseline_mae,
        alpha_mae,
        alpha_lift: baseline_mae - alpha_mae,
        win_prob_metrics: calibration::evaluate_probs(&win_predictions, &win_outcomes),
        reliability: calibration::calibration_bins(&win_predictions, &win_outcomes, 10),
        warnings,
    }
}

fn weighted_mae(rows: &[(f64, usize)]) -> f64 {
    let total: usize = rows.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return 0.0;
    }
    rows.iter().map(|(mae, n)| mae * *n as f64).sum::<f64>() / total as f64
}

/// Earliest scheduled kickoff across the league for a week.
pub fn kickoff_for_week(league: &LeagueContext, week: u32) -> Option<DateTime<Utc>> {
    league
        .all_players()
        .filter_map(|p| p.schedule.get(&week))
        .map(|g| g.kickoff)
        .min()
}

/// Normal-approximation p(home wins) from projected lineup totals.
fn matchup_win_probability(
    league: &LeagueContext,
    projections: &HashMap<u64, PlayerProjection>,
    home_team_id: u32,
    away_team_id: u32,
) -> Option<f64> {
    let home = lineup_distribution(league, projections, home_team_id)?;
    let away = lineup_distribution(league, projections, away_team_id)?;
    let spread_std = (home.1 * home.1 + away.1 * away.1).sqrt().max(1.0);
    Some(normal_cdf((home.0 - away.0) / spread_std))
}

fn lineup_distribution(
    league: &LeagueContext,
    projections: &HashMap<u64, PlayerProjection>,
    team_id: u32,
) -> Option<(f64, f64)> {
    let team = league.team(team_id)?;
    let slots = lineup::slots_from_settings(&league.settings.lineup_slots);
    let reg = league.settings.reg_season_count;
    let starters = lineup::optimal_lineup(&team.roster, &slots, |p: &Player| {
        projections
            .get(&p.player_id)
            .map(|proj| proj.blended_mean)
            .unwrap_or_else(|| p.weekly_baseline(reg))
    });
    if starters.is_empty() {
        return None;
    }
    let mean: f64 = starters
        .iter()
        .map(|p| {
            projections
                .get(&p.player_id)
                .map(|proj| proj.blended_mean)
                .unwrap_or_else(|| p.weekly_baseline(reg))
        })
        .sum();
    let variance: f64 = starters
        .iter()
        .map(|p| {
            let sigma = projections
                .get(&p.player_id)
                .map(|proj| proj.uncertainty)
                .unwrap_or(5.0);
            sigma * sigma
        })
        .sum();
    Some((mean, variance.sqrt()))
}

/// Abramowitz-Stegun style approximation; good to ~1e-7.
fn normal_cdf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * z.abs());
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let tail = (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt() * poly;
    if z >= 0.0 { 1.0 - tail } else { tail }
}

// ---------------------------------------------------------------------------
// Quick alpha lift
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickLift {
    /// Mean (optimized - current) lineup points across teams.
    pub weekly_points_delta: f64,
    pub brier_score: f64,
    pub teams_evaluated: usize,
}

/// One-pass comparison of set lineups vs alpha-optimized lineups under the
/// same projection map.
pub fn quick_alpha_lift(
    league: &LeagueContext,
    projections: &HashMap<u64, PlayerProjection>,
) -> QuickLift {
    let slots = lineup::slots_from_settings(&league.settings.lineup_slots);
    let reg = league.settings.reg_season_count;
    let mut delta_sum = 0.0;
    let mut brier_terms = Vec::new();

    for team in &league.teams {
        let projected = |p: &Player| -> f64 {
            projections
                .get(&p.player_id)
                .map(|proj| proj.blended_mean)
                .unwrap_or_else(|| p.weekly_baseline(reg))
        };

        let current: Vec<&Player> = {
            let set: Vec<&Player> = team.roster.iter().filter(|p| p.is_current_starter()).collect();
            if set.is_empty() {
                lineup::optimal_lineup(&team.roster, &slots, |p| p.weekly_baseline(reg))
            } else {
                set
            }
        };
        let optimized = lineup::optimal_lineup(&team.roster, &slots, projected);

        let current_points: f64 = current.iter().map(|p| projected(p)).sum();
        let optimized_points: f64 = optimized.iter().map(|p| projected(p)).sum();
        delta_sum += optimized_points - current_points;

        let denom = (current_points + optimized_points).max(1.0);
        let p_win = optimized_points / denom;
        let outcome = if optimized_points >= current_points { 1.0 } else { 0.0 };
        brier_terms.push((p_win - outcome) * (p_win - outcome));
    }

    let teams = league.teams.len().max(1);
    QuickLift {
        weekly_points_delta: delta_sum / teams as f64,
        brier_score: brier_terms.iter().sum::<f64>() / brier_terms.len().max(1) as f64,
        teams_evaluated: league.teams.len(),
    }
}

// ---------------------------------------------------------------------------
// A/B seed sweep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbGateConfig {
    pub min_weekly_points_lift: f64,
    pub max_downside_probability: f64,
    pub min_successful_seeds: usize,
}

impl Default for AbGateConfig {
    fn default() -> Self {
        Self {
            min_weekly_points_lift: 0.0,
            max_downside_probability: 0.40,
            min_successful_seeds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbSeedRow {
    pub seed: u64,
    pub weekly_points_lift: f64,
    pub playoff_odds_lift: f64,
    pub championship_odds_lift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub p05: f64,
    pub p95: f64,
    pub downside_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbStatus {
    Pass,
    Fail,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbDecision {
    pub status: AbStatus,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbReport {
    pub team_id: u32,
    pub per_seed: Vec<AbSeedRow>,
    pub weekly_points_lift: MetricSummary,
    pub playoff_odds_lift: MetricSummary,
    pub championship_odds_lift: MetricSummary,
    pub decision: AbDecision,
}

/// Baseline vs alpha across independent seeds. Each seed runs both arms on
/// identical inputs; the gate turns the lift distribution into a verdict.
pub fn run_ab_evaluation(
    league: &LeagueContext,
    model: &PlayerModelStore,
    sim: &SimulationConfig,
    alpha: &AlphaConfig,
    projections: &HashMap<u64, PlayerProjection>,
    team_id: u32,
    seeds: &[u64],
    gate: &AbGateConfig,
) -> AbReport {
    let lift = quick_alpha_lift(league, projections);

    let mut per_seed = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let seeded = SimulationConfig {
            seed: Some(*seed),
            ..sim.clone()
        };
        let engine = MonteCarloEngine::new(league, model, &seeded);
        let baseline_ratings = engine.team_ratings();
        let alpha_ratings = engine.team_ratings_with_alpha(projections, alpha);

        let baseline_odds = engine.run_simulations(&baseline_ratings);
        let alpha_odds = engine.run_simulations(&alpha_ratings);

        let find = |rows: &[crate::monte_carlo::SeasonOdds]| {
            rows.iter()
                .find(|o| o.team_id == team_id)
                .map(|o| (o.playoff_probability, o.championship_probability))
                .unwrap_or((0.0, 0.0))
        };
        let (base_playoff, base_champ) = find(&baseline_odds);
        let (alpha_playoff, alpha_champ) = find(&alpha_odds);

        per_seed.push(AbSeedRow {
            seed: *seed,
            weekly_points_lift: lift.weekly_points_delta,
            playoff_odds_lift: alpha_playoff - base_playoff,
            championship_odds_lift: alpha_champ - base_champ,
        });
    }

    let weekly: Vec<f64> = per_seed.iter().map(|r| r.weekly_points_lift).collect();
    let playoff: Vec<f64> = per_seed.iter().map(|r| r.playoff_odds_lift).collect();
    let champ: Vec<f64> = per_seed.iter().map(|r| r.championship_odds_lift).collect();

    let weekly_summary = metric_summary("weekly_points_lift", &weekly);
    let decision = gate_decision(&weekly_summary, per_seed.len(), gate);

    AbReport {
        team_id,
        per_seed,
        weekly_points_lift: weekly_summary,
        playoff_odds_lift: metric_summary("playoff_odds_lift", &playoff),
        championship_odds_lift: metric_summary("championship_odds_lift", &champ),
        decision,
    }
}

fn metric_summary(metric: &str, values: &[f64]) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary {
            metric: metric.to_string(),
            n: 0,
            mean: 0.0,
            median: 0.0,
            std: 0.0,
            p05: 0.0,
            p95: 0.0,
            downside_probability: 1.0,
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n >= 2 {
        (sorted.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    let pick = |q: f64| {
        let rank = (q * (n - 1) as f64).round() as usize;
        sorted[rank.min(n - 1)]
    };
    MetricSummary {
        metric: metric.to_string(),
        n,
        mean,
        median: pick(0.5),
        std,
        p05: pick(0.05),
        p95: pick(0.95),
        downside_probability: sorted.iter().filter(|v| **v < 0.0).count() as f64 / n as f64,
    }
}

fn gate_decision(summary: &MetricSummary, successful_seeds: usize, gate: &AbGateConfig) -> AbDecision {
    let mut reasons = Vec::new();

    if successful_seeds < gate.min_successful_seeds {
        reasons.push(format!(
            "Insufficient successful seeds ({successful_seeds}) < min_successful_seeds ({})",
            gate.min_successful_seeds
        ));
        return AbDecision {
            status: AbStatus::Inconclusive,
            reasons,
        };
    }

    if summary.mean > gate.min_weekly_points_lift
        && summary.downside_probability <= gate.max_downside_probability
    {
        reasons.push(format!(
            "Mean weekly points lift {:.3} > {:.3} and downside probability {:.3} <= {:.3}",
            summary.mean,
            gate.min_weekly_points_lift,
            summary.downside_probability,
            gate.max_downside_probability
        ));
        return AbDecision {
            status: AbStatus::Pass,
            reasons,
        };
    }

    if summary.p95 <= gate.min_weekly_points_lift
        || summary.downside_probability > gate.max_downside_probability
    {
        reasons.push(format!(
            "Lift profile did not clear the gate: p95={:.3}, mean={:.3}, downside={:.3}",
            summary.p95, summary.mean, summary.downside_probability
        ));
        return AbDecision {
            status: AbStatus::Fail,
            reasons,
        };
    }

    reasons.push(format!(
        "Confidence band overlaps the threshold: p05={:.3}, p95={:.3}, threshold={:.3}",
        summary.p05, summary.p95, gate.min_weekly_points_lift
    ));
    AbDecision {
        status: AbStatus::Inconclusive,
        reasons,
    }
}
