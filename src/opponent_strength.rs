// Position-vs-defense strength from in-league scoring.
//
// For each (position, defending pro team) pair: average points scored
// against that defense per observed week, over the league-wide per-week
// average at the position. No external rankings are consulted.

use std::collections::HashMap;

use crate::league::{LeagueContext, Position};

pub const MULTIPLIER_RANGE: (f64, f64) = (0.70, 1.30);

/// Fewer observed weeks than this marks the pair as thin.
pub const THIN_DVP_WEEKS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct DvpMultiplier {
    pub value: f64,
    pub weeks_observed: u32,
    pub thin_dvp: bool,
}

impl DvpMultiplier {
    pub fn neutral() -> Self {
        Self {
            value: 1.0,
            weeks_observed: 0,
            thin_dvp: true,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    points: f64,
    appearances: u32,
    weeks: std::collections::HashSet<u32>,
}

#[derive(Debug)]
pub struct OpponentStrength {
    multipliers: HashMap<(Position, String), DvpMultiplier>,
}

impl OpponentStrength {
    /// Walk every scored week up to (excluding) the current one and tally
    /// what each defense has allowed to each position.
    pub fn compute(league: &LeagueContext) -> OpponentStrength {
        let through_week = league.current_week.saturating_sub(1);

        let mut by_defense: HashMap<(Position, String), Accumulator> = HashMap::new();
        let mut league_points: HashMap<Position, (f64, u32)> = HashMap::new();

        for player in league.all_players() {
            for (week, stat) in &player.stats {
                if *week < 1 || *week > through_week || stat.points <= 0.0 {
                    continue;
                }
                let Some(game) = player.schedule.get(week) else {
                    continue;
                };
                let defense = game.opponent.trim().to_ascii_uppercase();
                if defense.is_empty() {
                    continue;
                }

                let entry = by_defense
                    .entry((player.position, defense))
                    .or_default();
                entry.points += stat.points;
                entry.appearances += 1;
                entry.weeks.insert(*week);

                let league_entry = league_points.entry(player.position).or_insert((0.0, 0));
                league_entry.0 += stat.points;
                league_entry.1 += 1;
            }
        }

        let mut multipliers = HashMap::new();
        for ((position, defense), acc) in by_defense {
            let Some((league_sum, league_n)) = league_points.get(&position) else {
                continue;
            };
            if *league_n == 0 || acc.appearances == 0 {
                continue;
            }
            let league_mean = league_sum / f64::from(*league_n);
            if league_mean <= 0.0 {
                continue;
            }
            let allowed_mean = acc.points / f64::from(acc.appearances);
            let weeks_observed = acc.weeks.len() as u32;
            multipliers.insert(
                (position, defense),
                DvpMultiplier {
                    value: (allowed_mean / league_mean)
                        .clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1),
                    weeks_observed,
                    thin_dvp: weeks_observed < THIN_DVP_WEEKS,
                },
            );
        }

        OpponentStrength { multipliers }
    }

    /// Multiplier for a position against a defense. Missing data and
    /// untracked positions resolve to neutral.
    pub fn multiplier(&self, position: Position, defense: &str) -> DvpMultiplier {
        if !position.is_dvp_tracked() {
            return DvpMultiplier::neutral();
        }
        let key = (position, defense.trim().to_ascii_uppercase());
        self.multipliers
            .get(&key)
            .copied()
            .unwrap_or_else(DvpMultiplier::neutral)
    }

    pub fn tracked_pairs(&self) -> usize {
        self.multipliers.len()
    }
}
