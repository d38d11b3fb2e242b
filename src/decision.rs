// Decision services: lineup recommendations, free-agent pickups, and trade
// analysis built on the ROS valuator and the alpha projections.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::alpha_model::PlayerProjection;
use crate::config::AnalysisConfig;
use crate::league::{LeagueContext, Player, Position, Team};
use crate::lineup::{self, Slot};
use crate::ros_value::RosValuator;

/// Skip 1-for-1 swaps of same-position players whose projections are within
/// this many points; nobody trades those.
const SAME_POSITION_MIN_GAP: f64 = 1.0;

const ACCEPTANCE_IMBALANCE_LIMIT: f64 = 15.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedPlayer {
    pub player_id: u64,
    pub name: String,
    pub position: Position,
    pub baseline: f64,
    pub alpha_projection: f64,
    pub uncertainty: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRecommendation {
    pub slot: String,
    pub recommended: Option<RecommendedPlayer>,
    /// Set when the slot could not be filled cleanly: nobody eligible, or
    /// the best option still carries an injury designation.
    pub flagged: bool,
    pub alternatives: Vec<RecommendedPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupAudit {
    pub total_baseline: f64,
    pub total_alpha: f64,
    pub alpha_lift: f64,
    pub confidence_level: String,
    pub decision_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupRecommendation {
    pub team_id: u32,
    pub week: u32,
    pub slots: Vec<SlotRecommendation>,
    pub audit: LineupAudit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeAgentRecommendation {
    pub player_id: u64,
    pub name: String,
    pub position: Position,
    pub delta_ros_pts_per_week: f64,
    pub drop_candidate: Option<String>,
    pub fa_ros_pts_per_week: f64,
    pub fa_season_avg: f64,
    pub drop_ros_pts_per_week: f64,
    pub drop_season_avg: f64,
    pub priority: Priority,
    pub ownership_pct: f64,
    pub uses_ros: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAnalysis {
    pub my_value_change: f64,
    pub their_value_change: f64,
    pub advantage_margin: f64,
    pub asymmetric_advantage: bool,
    /// Percent, 0-100.
    pub acceptance_probability: f64,
    pub is_realistic: bool,
    pub recommendation: TradeRecommendation,
    pub uses_ros: bool,
    pub weeks_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRecommendation {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOpportunity {
    pub other_team_id: u32,
    pub other_team_name: String,
    pub give: Vec<String>,
    pub receive: Vec<String>,
    pub analysis: TradeAnalysis,
}

pub struct DecisionEngine<'a> {
    league: &'a LeagueContext,
    valuator: &'a RosValuator<'a>,
    config: &'a AnalysisConfig,
    seed: u64,
    slots: Vec<Slot>,
    ros_cache: HashMap<u64, f64>,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(
        league: &'a LeagueContext,
        valuator: &'a RosValuator<'a>,
        config: &'a AnalysisConfig,
        seed: u64,
    ) -> Self {
        Self {
            league,
            valuator,
            config,
            seed,
            slots: lineup::slots_from_settings(&league.settings.lineup_slots),
            ros_cache: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------
    // ROS values, memoized per player for stable orderings
    // -----------------------------------------------------------------

    fn player_ros(&mut self, player: &Player) -> f64 {
        if let Some(value) = self.ros_cache.get(&player.player_id) {
            return *value;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ player.player_id.rotate_left(17));
        let value = self.valuator.player_ros(player, &mut rng).pts_per_week;
        self.ros_cache.insert(player.player_id, value);
        value
    }

    fn roster_value(&mut self, roster: &[Player]) -> f64 {
        let reg = self.league.settings.reg_season_count;
        let starters = lineup::optimal_lineup(roster, &self.slots, |p| p.weekly_baseline(reg));
        let starter_ids: Vec<u64> = starters.iter().map(|p| p.player_id).collect();

        let mut value = 0.0;
        for player in roster {
            let ros = self.player_ros(player);
            if starter_ids.contains(&player.player_id) {
                value += ros * crate::ros_value::scarcity_weight(player.position);
            } else {
                value += ros * crate::ros_value::BENCH_WEIGHT;
            }
        }
        value
    }

    fn season_value(&self, roster: &[Player]) -> f64 {
        let reg = self.league.settings.reg_season_count;
        let starters = lineup::optimal_lineup(roster, &self.slots, |p| p.weekly_baseline(reg));
        let starter_ids: Vec<u64> = starters.iter().map(|p| p.player_id).collect();
        roster
            .iter()
            .map(|p| {
                let base = p.weekly_baseline(reg);
                if starter_ids.contains(&p.player_id) {
                    base * crate::ros_value::scarcity_weight(p.position)
                } else {
                    base * crate::ros_value::BENCH_WEIGHT
                }
            })
            .sum()
    }

    // -----------------------------------------------------------------
    // Lineup recommendation
    // -----------------------------------------------------------------

    /// Fill each starting slot with the highest `blended_mean - lambda *
    /// uncertainty` among eligible players. `risk_lambda` zero plays for the
    /// ceiling; positive values play for the floor.
    pub fn recommend_lineup(
        &self,
        team_id: u32,
        week: u32,
        projections: &HashMap<u64, PlayerProjection>,
        risk_lambda: f64,
    ) -> Option<LineupRecommendation> {
        let team = self.league.team(team_id)?;
        let reg = self.league.settings.reg_season_count;

        let score = |player: &Player| -> f64 {
            match projections.get(&player.player_id) {
                Some(projection) => {
                    projection.blended_mean - risk_lambda * projection.uncertainty
                }
                None => player.weekly_baseline(reg),
            }
        };

        let rows = lineup::lineup_by_slot(&team.roster, &self.slots, score);
        let chosen_ids: Vec<u64> = rows
            .iter()
            .filter_map(|(_, p)| p.map(|p| p.player_id))
            .collect();

        let describe = |player: &Player| -> RecommendedPlayer {
            let projection = projections.get(&player.player_id);
            RecommendedPlayer {
                player_id: player.player_id,
                name: player.name.clone(),
                position: player.position,
                baseline: projection
                    .map(|p| p.baseline)
                    .unwrap_or_else(|| player.weekly_baseline(reg)),
                alpha_projection: projection
                    .map(|p| p.blended_mean)
                    .unwrap_or_else(|| player.weekly_baseline(reg)),
                uncertainty: projection.map(|p| p.uncertainty).unwrap_or(0.0),
                confidence: projection.map(|p| p.confidence).unwrap_or(0.5),
            }
        };

        let mut slots = Vec::with_capacity(rows.len());
        for (slot, pick) in &rows {
            let mut alternatives: Vec<RecommendedPlayer> = team
                .roster
                .iter()
                .filter(|p| {
                    slot.eligible(p)
                        && !chosen_ids.contains(&p.player_id)
                })
                .map(describe)
                .collect();
            alternatives.sort_by(|a, b| {
                b.alpha_projection
                    .partial_cmp(&a.alpha_projection)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            alternatives.truncate(3);

            let recommended = pick.map(describe);
            let flagged = match pick {
                None => true,
                Some(player) => !matches!(
                    player.status_token(),
                    "" | "ACTIVE" | "NORMAL"
                ),
            };

            slots.push(SlotRecommendation {
                slot: slot.label().to_string(),
                recommended,
                flagged,
                alternatives,
            });
        }

        let picks: Vec<&RecommendedPlayer> = slots
            .iter()
            .filter_map(|s| s.recommended.as_ref())
            .collect();
        let total_baseline: f64 = picks.iter().map(|p| p.baseline).sum();
        let total_alpha: f64 = picks.iter().map(|p| p.alpha_projection).sum();
        let mean_confidence = if picks.is_empty() {
            0.0
        } else {
            picks.iter().map(|p| p.confidence).sum::<f64>() / picks.len() as f64
        };
        let confidence_level = if mean_confidence >= 0.75 {
            "high"
        } else if mean_confidence >= 0.5 {
            "medium"
        } else {
            "low"
        };

        Some(LineupRecommendation {
            team_id,
            week,
            audit: LineupAudit {
                total_baseline,
                total_alpha,
                alpha_lift: total_alpha - total_baseline,
                confidence_level: confidence_level.to_string(),
                decision_factors: decision_factors(&chosen_ids, projections),
            },
            slots,
        })
    }

    // -----------------------------------------------------------------
    // Free agents
    // -----------------------------------------------------------------

    pub fn recommend_free_agents(&mut self, team_id: u32) -> Vec<FreeAgentRecommendation> {
        let Some(team) = self.league.team(team_id) else {
            return Vec::new();
        };
        let reg = self.league.settings.reg_season_count;
        let use_ros = self.config.use_ros;
        let team_roster = team.roster.clone();
        let current_value = if use_ros {
            self.roster_value(&team_roster)
        } else {
            self.season_value(&team_roster)
        };

        let league = self.league;
        let mut recommendations = Vec::new();
        for fa in &league.free_agents {
            if let Some(filter) = &self.config.positions_filter
                && !filter
                    .iter()
                    .any(|p| Position::parse(p) == Some(fa.position))
            {
                continue;
            }

            // Whitelist: anything outside the explicitly-healthy set drops.
            if self.config.exclude_injured
                && !matches!(fa.status_token(), "" | "ACTIVE" | "NORMAL")
            {
                continue;
            }

            let position_mates: Vec<&Player> = team_roster
                .iter()
                .filter(|p| p.position == fa.position)
                .collect();

            let fa_value = if use_ros {
                self.player_ros(fa)
            } else {
                fa.weekly_baseline(reg)
            };
            let fa_season_avg = fa.weekly_baseline(reg);

            let (delta, drop_candidate, drop_value, drop_season_avg) = if position_mates
                .is_empty()
            {
                // Position the roster does not carry yet: value it, but at a
                // discount against proven needs.
                (fa_value * 0.5, None, 0.0, 0.0)
            } else {
                if use_ros {
                    for mate in &position_mates {
                        self.player_ros(mate);
                    }
                }
                let drop = position_mates
                    .iter()
                    .copied()
                    .min_by(|a, b| {
                        let av = if use_ros {
                            self.ros_cache[&a.player_id]
                        } else {
                            a.weekly_baseline(reg)
                        };
                        let bv = if use_ros {
                            self.ros_cache[&b.player_id]
                        } else {
                            b.weekly_baseline(reg)
                        };
                        av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("non-empty position mates");

                let mut new_roster: Vec<Player> = team_roster
                    .iter()
                    .filter(|p| p.player_id != drop.player_id)
                    .cloned()
                    .collect();
                new_roster.push(fa.clone());

                let new_value = if use_ros {
                    self.roster_value(&new_roster)
                } else {
                    self.season_value(&new_roster)
                };
                let drop_value = if use_ros {
                    self.ros_cache[&drop.player_id]
                } else {
                    drop.weekly_baseline(reg)
                };
                (
                    new_value - current_value,
                    Some(drop.name.clone()),
                    drop_value,
                    drop.weekly_baseline(reg),
                )
            };

            if delta <= 0.0 {
                continue;
            }

            let priority = if delta >= 3.0 {
                Priority::High
            } else if delta >= 1.0 {
                Priority::Medium
            } else {
                Priority::Low
            };

            recommendations.push(FreeAgentRecommendation {
                player_id: fa.player_id,
                name: fa.name.clone(),
                position: fa.position,
                delta_ros_pts_per_week: delta,
                drop_candidate,
                fa_ros_pts_per_week: fa_value,
                fa_season_avg,
                drop_ros_pts_per_week: drop_value,
                drop_season_avg,
                priority,
                ownership_pct: fa.percent_owned,
                uses_ros: use_ros,
            });
        }

        recommendations.sort_by(|a, b| {
            b.delta_ros_pts_per_week
                .partial_cmp(&a.delta_ros_pts_per_week)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        recommendations.truncate(self.config.top_n_recommendations.max(1));
        recommendations
    }

    // -----------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------

    pub fn analyze_trade(
        &mut self,
        my_team_id: u32,
        other_team_id: u32,
        my_player_ids: &[u64],
        their_player_ids: &[u64],
        weeks_remaining: Option<u32>,
    ) -> Option<TradeAnalysis> {
        let my_team = self.league.team(my_team_id)?.clone();
        let other_team = self.league.team(other_team_id)?.clone();
        let use_ros = self.config.use_ros;

        let weeks_remaining = weeks_remaining.unwrap_or_else(|| {
            self.league
                .reg_season_final_week()
                .saturating_sub(self.league.current_week)
                + 1
        });

        let value_of = |engine: &mut Self, roster: &[Player]| -> f64 {
            if use_ros {
                engine.roster_value(roster)
            } else {
                engine.season_value(roster)
            }
        };

        let my_before = value_of(self, &my_team.roster);
        let their_before = value_of(self, &other_team.roster);

        let my_after_roster = swap_players(&my_team, &other_team, my_player_ids, their_player_ids);
        let their_after_roster =
            swap_players(&other_team, &my_team, their_player_ids, my_player_ids);

        let my_after = value_of(self, &my_after_roster);
        let their_after = value_of(self, &their_after_roster);

        let my_value_change = my_after - my_before;
        let their_value_change = their_after - their_before;
        let advantage_margin = my_value_change - their_value_change;

        let acceptance_probability = acceptance_probability(
            my_value_change,
            their_value_change,
            their_before,
            advantage_margin,
        );
        let is_realistic = acceptance_probability >= self.config.min_acceptance_probability;
        let recommendation = if my_value_change >= self.config.min_advantage && is_realistic {
            TradeRecommendation::Accept
        } else {
            TradeRecommendation::Reject
        };

        Some(TradeAnalysis {
            my_value_change,
            their_value_change,
            advantage_margin,
            asymmetric_advantage: my_value_change > their_value_change,
            acceptance_probability,
            is_realistic,
            recommendation,
            uses_ros: use_ros,
            weeks_remaining,
        })
    }

    /// Enumerate 1-for-1 and 2-for-1 offers against every other team,
    /// keeping the realistic ones with the largest advantage.
    pub fn find_trade_opportunities(&mut self, my_team_id: u32) -> Vec<TradeOpportunity> {
        let Some(my_team) = self.league.team(my_team_id).cloned() else {
            return Vec::new();
        };
        let reg = self.league.settings.reg_season_count;
        let mut opportunities = Vec::new();

        let other_teams: Vec<Team> = self
            .league
            .teams
            .iter()
            .filter(|t| t.team_id != my_team_id)
            .cloned()
            .collect();

        for other in &other_teams {
            let mut team_trades: Vec<TradeOpportunity> = Vec::new();

            for my_player in &my_team.roster {
                for their_player in &other.roster {
                    if my_player.position == their_player.position
                        && (my_player.weekly_baseline(reg) - their_player.weekly_baseline(reg))
                            .abs()
                            < SAME_POSITION_MIN_GAP
                    {
                        continue;
                    }
                    if let Some(analysis) = self.analyze_trade(
                        my_team_id,
                        other.team_id,
                        &[my_player.player_id],
                        &[their_player.player_id],
                        None,
                    ) && keeps(&analysis, self.config.min_advantage)
                    {
                        team_trades.push(TradeOpportunity {
                            other_team_id: other.team_id,
                            other_team_name: other.team_name.clone(),
                            give: vec![my_player.name.clone()],
                            receive: vec![their_player.name.clone()],
                            analysis,
                        });
                    }
                }
            }

            for their_player in &other.roster {
                for (idx, first) in my_team.roster.iter().enumerate() {
                    for second in my_team.roster.iter().skip(idx + 1) {
                        if let Some(analysis) = self.analyze_trade(
                            my_team_id,
                            other.team_id,
                            &[first.player_id, second.player_id],
                            &[their_player.player_id],
                            None,
                        ) && keeps(&analysis, self.config.min_advantage)
                        {
                            team_trades.push(TradeOpportunity {
                                other_team_id: other.team_id,
                                other_team_name: other.team_name.clone(),
                                give: vec![first.name.clone(), second.name.clone()],
                                receive: vec![their_player.name.clone()],
                                analysis,
                            });
                        }
                    }
                }
            }

            team_trades.sort_by(|a, b| {
                b.analysis
                    .advantage_margin
                    .partial_cmp(&a.analysis.advantage_margin)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            team_trades.truncate(self.config.max_trades_per_team);
            opportunities.extend(team_trades);
        }

        opportunities.sort_by(|a, b| {
            b.analysis
                .advantage_margin
                .partial_cmp(&a.analysis.advantage_margin)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        opportunities.truncate(self.config.max_total_opportunities);
        opportunities
    }
}

fn keeps(analysis: &TradeAnalysis, min_advantage: f64) -> bool {
    analysis.my_value_change > min_advantage
        && analysis.asymmetric_advantage
        && analysis.is_realistic
}

fn swap_players(
    team: &Team,
    counterparty: &Team,
    outgoing: &[u64],
    incoming: &[u64],
) -> Vec<Player> {
    let mut roster: Vec<Player> = team
        .roster
        .iter()
        .filter(|p| !outgoing.contains(&p.player_id))
        .cloned()
        .collect();
    for id in incoming {
        if let Some(player) = counterparty.roster.iter().find(|p| p.player_id == *id) {
            roster.push(player.clone());
        }
    }
    roster
}

/// Deterministic acceptance model over the bilateral value deltas.
pub fn acceptance_probability(
    my_change: f64,
    their_change: f64,
    their_current_value: f64,
    advantage_margin: f64,
) -> f64 {
    let mut probability = if my_change > 0.0 && their_change >= 0.0 {
        // Both sides gain; sweeter for them means likelier yes.
        let ratio = if my_change.abs() > 1e-9 {
            their_change / my_change.abs()
        } else {
            1.0
        };
        (70.0 + ratio * 25.0).min(95.0)
    } else if my_change > 0.0 {
        let loss_pct = if their_current_value > 0.0 {
            their_change.abs() / their_current_value
        } else {
            1.0
        };
        if loss_pct <= 0.02 {
            60.0
        } else if loss_pct <= 0.05 {
            40.0
        } else if loss_pct <= 0.10 {
            20.0
        } else {
            5.0
        }
    } else {
        10.0
    };

    if advantage_margin.abs() > ACCEPTANCE_IMBALANCE_LIMIT {
        probability = probability.min(10.0);
    }
    probability
}

fn decision_factors(
    chosen_ids: &[u64],
    projections: &HashMap<u64, PlayerProjection>,
) -> Vec<String> {
    let mut weighted: Vec<(f64, String)> = Vec::new();
    for id in chosen_ids {
        let Some(projection) = projections.get(id) else {
            continue;
        };
        for contribution in &projection.contributions {
            if contribution.weighted.abs() > 1e-6 {
                weighted.push((
                    contribution.weighted.abs(),
                    factor_phrase(&contribution.signal, contribution.weighted),
                ));
            }
        }
    }
    weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut factors = Vec::new();
    for (_, phrase) in weighted {
        if !factors.contains(&phrase) {
            factors.push(phrase);
        }
        if factors.len() == 3 {
            break;
        }
    }
    if factors.is_empty() {
        factors.push("Projection driven by baseline prior".to_string());
    }
    factors
}

fn factor_phrase(signal: &str, weighted: f64) -> String {
    let direction = if weighted >= 0.0 { "boost" } else { "drag" };
    match signal {
        "projection_residual" => format!("Market projection {direction}"),
        "usage_trend" => format!("Usage trend {direction}"),
        "injury_opportunity" => format!("Injury situation {direction}"),
        "matchup_unit" => format!("Defensive matchup {direction}"),
        "game_script" => format!("Game script {direction}"),
        "volatility_aware" => format!("Volatility profile {direction}"),
        "weather_venue" => format!("Weather and venue {direction}"),
        "market_sentiment_contrarian" => format!("Contrarian market read {direction}"),
        "waiver_replacement_value" => format!("Replacement value {direction}"),
        "short_term_schedule_cluster" => format!("Upcoming schedule {direction}"),
        other => format!("{other} {direction}"),
    }
}
