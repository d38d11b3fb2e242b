// Rest-of-season valuation: schedule-adjusted weekly projections aggregated
// over the remaining fantasy regular season.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::league::{LeagueContext, Player, Position};
use crate::lineup::{self, Slot};
use crate::opponent_strength::OpponentStrength;
use crate::player_model::PlayerModelStore;

/// Bench production counts at a fraction of starter production.
pub const BENCH_WEIGHT: f64 = 0.3;

/// Positional scarcity weights applied to starter values.
pub fn scarcity_weight(position: Position) -> f64 {
    match position {
        Position::Qb | Position::Te => 1.2,
        Position::Rb | Position::Wr => 1.1,
        Position::K => 0.5,
        Position::Def => 0.7,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRosValue {
    pub player_id: u64,
    /// Schedule-adjusted points per remaining week.
    pub pts_per_week: f64,
    pub weeks: u32,
    /// Weeks valued at a neutral multiplier because the schedule was missing.
    pub no_schedule_weeks: u32,
    pub thin_dvp_weeks: u32,
    pub empty_horizon: bool,
}

pub struct RosValuator<'a> {
    pub league: &'a LeagueContext,
    pub model: &'a PlayerModelStore,
    pub strength: &'a OpponentStrength,
}

impl<'a> RosValuator<'a> {
    pub fn new(
        league: &'a LeagueContext,
        model: &'a PlayerModelStore,
        strength: &'a OpponentStrength,
    ) -> Self {
        Self {
            league,
            model,
            strength,
        }
    }

    /// ROS horizon: current week through the regular-season final week,
    /// inclusive.
    pub fn player_ros(&self, player: &Player, rng: &mut ChaCha8Rng) -> PlayerRosValue {
        self.player_ros_between(
            player,
            self.league.current_week,
            self.league.reg_season_final_week(),
            rng,
        )
    }

    pub fn player_ros_between(
        &self,
        player: &Player,
        start_week: u32,
        end_week: u32,
        rng: &mut ChaCha8Rng,
    ) -> PlayerRosValue {
        if start_week > end_week {
            return PlayerRosValue {
                player_id: player.player_id,
                pts_per_week: 0.0,
                weeks: 0,
                no_schedule_weeks: 0,
                thin_dvp_weeks: 0,
                empty_horizon: true,
            };
        }

        let reg_games = self.league.settings.reg_season_count;
        let mut total = 0.0;
        let mut no_schedule_weeks = 0;
        let mut thin_dvp_weeks = 0;

        for week in start_week..=end_week {
            // One state-biased draw when a trained model exists; the plain
            // projected average otherwise.
            let base = if self.model.has_model(player.player_id) {
                self.model.predict(player, 1, true, rng)[0]
            } else {
                player.weekly_baseline(reg_games)
            };

            let multiplier = match player.schedule.get(&week) {
                Some(game) => {
                    let dvp = self.strength.multiplier(player.position, &game.opponent);
                    if dvp.thin_dvp {
                        thin_dvp_weeks += 1;
                    }
                    dvp.value
                }
                None => {
                    no_schedule_weeks += 1;
                    1.0
                }
            };

            total += base * multiplier;
        }

        let weeks = end_week - start_week + 1;
        PlayerRosValue {
            player_id: player.player_id,
            pts_per_week: total / f64::from(weeks),
            weeks,
            no_schedule_weeks,
            thin_dvp_weeks,
            empty_horizon: false,
        }
    }

    /// Roster value: scarcity-weighted optimal starters plus discounted
    /// bench, in ROS points per week.
    pub fn roster_ros(&self, roster: &[Player], rng: &mut ChaCha8Rng) -> f64 {
        let slots = lineup::slots_from_settings(&self.league.settings.lineup_slots);
        self.roster_ros_with_slots(roster, &slots, rng)
    }

    pub fn roster_ros_with_slots(
        &self,
        roster: &[Player],
        slots: &[Slot],
        rng: &mut ChaCha8Rng,
    ) -> f64 {
        let reg_games = self.league.settings.reg_season_count;
        let starters = lineup::optimal_lineup(roster, slots, |p| p.weekly_baseline(reg_games));

        let mut value = 0.0;
        for starter in &starters {
            let ros = self.player_ros(starter, rng);
            value += ros.pts_per_week * scarcity_weight(starter.position);
        }
        for benched in lineup::bench(roster, &starters) {
            let ros = self.player_ros(benched, rng);
            value += ros.pts_per_week * BENCH_WEIGHT;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::{LeagueSettings, Outcome, ScheduledGame, Team, WeeklyStat};
    use crate::opponent_strength::OpponentStrength;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn schedule_for(weeks: &[(u32, &str)]) -> BTreeMap<u32, ScheduledGame> {
        weeks
            .iter()
            .map(|(week, opponent)| {
                (
                    *week,
                    ScheduledGame {
                        opponent: opponent.to_string(),
                        kickoff: Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap(),
                    },
                )
            })
            .collect()
    }

    fn projected_player(id: u64, position: Position, avg: f64) -> Player {
        Player {
            player_id: id,
            name: format!("P{id}"),
            position,
            pro_team: "GB".to_string(),
            stats: BTreeMap::new(),
            schedule: BTreeMap::new(),
            injury_status: None,
            active: true,
            percent_started: 50.0,
            percent_owned: 50.0,
            projected_avg_points: avg,
            projected_total_points: 0.0,
            avg_points: avg,
            lineup_slot: None,
        }
    }

    /// Builds a league whose historical scoring pins exact DVP multipliers:
    /// every defense in `defenses` has allowed `allowed` per week to RBs
    /// against a league average of 10.
    fn league_with_dvp(defenses: &[(&str, f64)], current_week: u32) -> LeagueContext {
        let mut roster = Vec::new();
        let mut id = 100;
        for (defense, allowed) in defenses {
            let mut player = projected_player(id, Position::Rb, 10.0);
            let mut stats = BTreeMap::new();
            let mut schedule = BTreeMap::new();
            for week in 1..=3 {
                stats.insert(
                    week,
                    WeeklyStat {
                        points: *allowed,
                        ..Default::default()
                    },
                );
                schedule.insert(
                    week,
                    ScheduledGame {
                        opponent: defense.to_string(),
                        kickoff: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
                    },
                );
            }
            player.stats = stats;
            player.schedule = schedule;
            roster.push(player);
            id += 1;
        }
        // Anchor players that pin the league mean at 10 points per week.
        for anchor in 0..6 {
            let mut player = projected_player(200 + anchor, Position::Rb, 10.0);
            let mut stats = BTreeMap::new();
            let mut schedule = BTreeMap::new();
            for week in 1..=3 {
                stats.insert(
                    week,
                    WeeklyStat {
                        points: 10.0,
                        ..Default::default()
                    },
                );
                schedule.insert(
                    week,
                    ScheduledGame {
                        opponent: format!("ANCHOR{anchor}"),
                        kickoff: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
                    },
                );
            }
            player.stats = stats;
            player.schedule = schedule;
            roster.push(player);
        }

        LeagueContext {
            league_id: 1,
            year: 2025,
            current_week,
            settings: LeagueSettings {
                reg_season_count: 14,
                ..LeagueSettings::default()
            },
            teams: vec![Team {
                team_id: 1,
                team_name: "A".to_string(),
                division: String::new(),
                roster,
                schedule: vec![1; 14],
                scores: vec![None; 14],
                outcomes: vec![Outcome::U; 14],
                acquisitions: 0,
                drops: 0,
                trades: 0,
            }],
            free_agents: Vec::new(),
            box_scores: BTreeMap::new(),
        }
    }

    fn empty_model(tag: &str) -> PlayerModelStore {
        let dir = std::env::temp_dir().join(format!("gridiron_ros_{tag}"));
        let _ = std::fs::remove_dir_all(&dir);
        PlayerModelStore::open(dir, 24).unwrap()
    }

    #[test]
    fn empty_horizon_returns_zero_with_flag() {
        let league = league_with_dvp(&[], 16);
        let model = empty_model("empty");
        let strength = OpponentStrength::compute(&league);
        let valuator = RosValuator::new(&league, &model, &strength);
        let player = projected_player(1, Position::Rb, 12.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ros = valuator.player_ros(&player, &mut rng);
        assert!(ros.empty_horizon);
        assert_eq!(ros.pts_per_week, 0.0);
    }

    #[test]
    fn single_week_horizon_at_final_week() {
        let league = league_with_dvp(&[], 14);
        let model = empty_model("final");
        let strength = OpponentStrength::compute(&league);
        let valuator = RosValuator::new(&league, &model, &strength);
        let player = projected_player(1, Position::Rb, 12.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ros = valuator.player_ros(&player, &mut rng);
        assert_eq!(ros.weeks, 1);
        assert!(!ros.empty_horizon);
    }

    #[test]
    fn missing_schedule_weeks_use_neutral_multiplier() {
        let league = league_with_dvp(&[], 13);
        let model = empty_model("neutral");
        let strength = OpponentStrength::compute(&league);
        let valuator = RosValuator::new(&league, &model, &strength);
        let player = projected_player(1, Position::Rb, 12.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ros = valuator.player_ros(&player, &mut rng);
        assert_eq!(ros.no_schedule_weeks, 2);
        assert!((ros.pts_per_week - 12.0).abs() < 1e-9);
    }

    #[test]
    fn schedule_difficulty_separates_equal_players() {
        // Defenses pinned near 0.76x and 1.20x of league average.
        let league = league_with_dvp(
            &[("SOFT1", 12.0), ("SOFT2", 12.0), ("TOUGH1", 7.6), ("TOUGH2", 7.6)],
            12,
        );
        let model = empty_model("sep");
        let strength = OpponentStrength::compute(&league);
        let valuator = RosValuator::new(&league, &model, &strength);

        let mut easy = projected_player(1, Position::Rb, 15.0);
        easy.schedule = schedule_for(&[(12, "SOFT1"), (13, "SOFT2"), (14, "SOFT1")]);
        let mut hard = projected_player(2, Position::Rb, 15.0);
        hard.schedule = schedule_for(&[(12, "TOUGH1"), (13, "TOUGH2"), (14, "TOUGH1")]);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let easy_ros = valuator.player_ros(&easy, &mut rng);
        let hard_ros = valuator.player_ros(&hard, &mut rng);
        let gap = easy_ros.pts_per_week - hard_ros.pts_per_week;
        assert!(
            (gap - 6.6).abs() < 0.8,
            "expected roughly 6.6 pts/week gap, got {gap}"
        );
    }

    #[test]
    fn roster_value_weights_starters_over_bench() {
        let league = league_with_dvp(&[], 10);
        let model = empty_model("weights");
        let strength = OpponentStrength::compute(&league);
        let valuator = RosValuator::new(&league, &model, &strength);

        let roster = vec![
            projected_player(1, Position::Rb, 15.0),
            projected_player(2, Position::Rb, 10.0),
        ];
        let slots = vec![Slot::Fixed(Position::Rb)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let value = valuator.roster_ros_with_slots(&roster, &slots, &mut rng);
        // 15 * 1.1 (RB scarcity) + 10 * 0.3 (bench).
        assert!((value - (15.0 * 1.1 + 10.0 * 0.3)).abs() < 1e-6);
    }
}
