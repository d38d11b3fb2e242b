// Blending layer: ESPN baseline + shrunk recent form + alpha adjustment,
// folded into one projection with uncertainty and confidence.

use serde::{Deserialize, Serialize};

use crate::alpha_signals::AlphaAdjustment;
use crate::config::AlphaConfig;
use crate::league::{Player, Position};

/// Position-dependent floor on projection uncertainty.
fn uncertainty_floor(position: Position) -> f64 {
    match position {
        Position::Qb => 3.5,
        Position::Rb | Position::Wr => 3.0,
        Position::Te | Position::Def => 2.5,
        Position::K => 2.0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProjection {
    pub player_id: u64,
    pub position: Position,
    pub baseline: f64,
    pub blended_mean: f64,
    pub uncertainty: f64,
    pub confidence: f64,
    pub contributions: Vec<crate::alpha_signals::SignalContribution>,
    pub warnings: Vec<String>,
}

impl PlayerProjection {
    pub fn alpha_lift(&self) -> f64 {
        self.blended_mean - self.baseline
    }
}

/// Penalty fraction for an injury status, from the configured map. Unmapped
/// statuses cost nothing.
fn injury_penalty(config: &AlphaConfig, status: &str) -> f64 {
    let key = status.trim().to_ascii_uppercase();
    if key.is_empty() {
        return 0.0;
    }
    config
        .injury_penalties
        .get(key.as_str())
        .copied()
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

pub fn project_player(
    player: &Player,
    week: u32,
    config: &AlphaConfig,
    adjustment: Option<&AlphaAdjustment>,
    reg_games: u32,
) -> PlayerProjection {
    let baseline = player.weekly_baseline(reg_games);

    let history = player.recent_points(week.saturating_sub(1));
    let recent: Vec<f64> = history
        .iter()
        .take(config.recent_weeks.max(1) as usize)
        .copied()
        .collect();
    let observed_weeks = recent.len() as f64;
    let recent_mean = if recent.is_empty() {
        baseline
    } else {
        recent.iter().sum::<f64>() / observed_weeks
    };

    // Thin samples collapse toward the baseline.
    let shrink = config.shrinkage_k.max(0.0) / (config.shrinkage_k.max(0.0) + observed_weeks);
    let shrunk_recent = baseline * shrink + recent_mean * (1.0 - shrink);

    let alpha = config.alpha_blend.clamp(0.0, 1.0);
    let alpha_delta = adjustment.map(|a| a.delta_mean_points).unwrap_or(0.0);
    let blended = (1.0 - alpha) * baseline + alpha * (shrunk_recent + alpha_delta);

    // Matchup multiplier after blending, injury discount last.
    let multiplier = adjustment.map(|a| a.matchup_multiplier).unwrap_or(1.0);
    let adjusted = blended * multiplier;

    let status = adjustment
        .map(|a| a.injury_status.clone())
        .or_else(|| player.injury_status.map(|s| s.as_str().to_string()))
        .unwrap_or_default();
    let penalty = injury_penalty(config, &status);
    let blended_mean = (adjusted - penalty * adjusted).max(0.0);

    let var_baseline = (baseline * 0.25).max(1.0);
    let var_recent = if recent.len() >= 2 {
        let mean = recent_mean;
        let variance = recent.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / (recent.len() - 1) as f64;
        variance.sqrt()
    } else if recent.len() == 1 {
        recent[0].abs() * 0.25
    } else {
        (baseline * 0.35).max(2.0)
    };
    let var_alpha = adjustment.map(|a| a.delta_stdev_points).unwrap_or(0.0);
    let uncertainty = (var_baseline * var_baseline
        + var_recent * var_recent
        + var_alpha * var_alpha)
        .sqrt()
        .max(uncertainty_floor(player.position));

    let confidence = match adjustment {
        Some(adjustment) => contribution_confidence(adjustment),
        None => 0.5,
    };

    PlayerProjection {
        player_id: player.player_id,
        position: player.position,
        baseline,
        blended_mean,
        uncertainty,
        confidence,
        contributions: adjustment
            .map(|a| a.contributions.clone())
            .unwrap_or_default(),
        warnings: adjustment.map(|a| a.warnings.clone()).unwrap_or_default(),
    }
}

/// Mean contribution confidence, weighted by absolute clipped contribution so
/// the signals that actually moved the number dominate.
fn contribution_confidence(adjustment: &AlphaAdjustment) -> f64 {
    let mut weight_sum = 0.0;
    let mut weighted = 0.0;
    for contribution in &adjustment.contributions {
        let w = contribution.clipped.abs();
        weight_sum += w;
        weighted += w * contribution.confidence;
    }
    if weight_sum <= 0.0 {
        let n = adjustment.contributions.len();
        if n == 0 {
            return 0.5;
        }
        return (adjustment
            .contributions
            .iter()
            .map(|c| c.confidence)
            .sum::<f64>()
            / n as f64)
            .clamp(0.0, 1.0);
    }
    (weighted / weight_sum).clamp(0.0, 1.0)
}

pub fn project_players<'a>(
    players: impl IntoIterator<Item = &'a Player>,
    week: u32,
    config: &AlphaConfig,
    adjustments: &std::collections::HashMap<u64, AlphaAdjustment>,
    reg_games: u32,
) -> std::collections::HashMap<u64, PlayerProjection> {
    players
        .into_iter()
        .map(|player| {
            let projection = project_player(
                player,
                week,
                config,
                adjustments.get(&player.player_id),
                reg_games,
            );
            (player.player_id, projection)
        })
        .collect()
}
