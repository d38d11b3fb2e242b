// Monte Carlo engine: matchup, season, and playoff simulation on top of the
// player models and team ratings.
//
// Determinism contract: every run derives all randomness from one root seed.
// Work is split into fixed-size chunks, each with its own generator keyed by
// (root seed, chunk index), so parallel and sequential execution of the same
// seed produce identical aggregates on any machine.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alpha_model::PlayerProjection;
use crate::config::{AlphaConfig, SimulationConfig};
use crate::gmm::sample_normal;
use crate::league::{LeagueContext, Outcome, Player, Position, Team};
use crate::lineup::{self, Slot};
use crate::player_model::PlayerModelStore;

const SIM_CHUNK: usize = 512;

/// Observed weeks needed before in-season scoring fully earns its configured
/// blend weight; thinner samples keep the preseason prior dominant.
const OBSERVED_FULL_WEIGHT_WEEKS: f64 = 3.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamRating {
    pub mean: f64,
    pub stdev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchupResult {
    pub team1_id: u32,
    pub team2_id: u32,
    pub n_simulations: usize,
    /// Percent, 0-100.
    pub team1_win_probability: f64,
    pub team2_win_probability: f64,
    pub team1_mean: f64,
    pub team1_stdev: f64,
    pub team1_range: (f64, f64, f64),
    pub team2_mean: f64,
    pub team2_stdev: f64,
    pub team2_range: (f64, f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonOdds {
    pub team_id: u32,
    pub mean_wins: f64,
    pub mean_points_for: f64,
    /// Percent, 0-100.
    pub playoff_probability: f64,
    pub championship_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterAnalysis {
    pub composition: HashMap<String, f64>,
    pub star_players: usize,
    pub total_projection: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: String,
    pub iterations: usize,
    pub championships: usize,
    pub championship_rosters: Vec<RosterAnalysis>,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledMatchup {
    week: u32,
    team1_id: u32,
    team2_id: u32,
}

pub struct MonteCarloEngine<'a> {
    league: &'a LeagueContext,
    model: &'a PlayerModelStore,
    sim: &'a SimulationConfig,
    slots: Vec<Slot>,
    schedule: Vec<ScheduledMatchup>,
}

impl<'a> MonteCarloEngine<'a> {
    pub fn new(
        league: &'a LeagueContext,
        model: &'a PlayerModelStore,
        sim: &'a SimulationConfig,
    ) -> Self {
        let slots = lineup::slots_from_settings(&league.settings.lineup_slots);
        let schedule = remaining_schedule(league);
        Self {
            league,
            model,
            sim,
            slots,
            schedule,
        }
    }

    fn root_seed(&self, salt: u64) -> u64 {
        self.sim.seed.unwrap_or(0x5eed_0000).wrapping_add(salt)
    }

    pub fn starters<'t>(&self, team: &'t Team) -> Vec<&'t Player> {
        let reg = self.league.settings.reg_season_count;
        lineup::optimal_lineup(&team.roster, &self.slots, |p| p.weekly_baseline(reg))
    }

    // -----------------------------------------------------------------
    // Team ratings
    // -----------------------------------------------------------------

    /// Baseline ratings: optimal-starter projections as the prior, blended
    /// with observed scoring per `ratings_blend`. The prior dominates until
    /// enough weeks are on the books.
    pub fn team_ratings(&self) -> HashMap<u32, TeamRating> {
        self.league
            .teams
            .iter()
            .map(|team| (team.team_id, self.rate_team(team)))
            .collect()
    }

    fn rate_team(&self, team: &Team) -> TeamRating {
        let starters = self.starters(team);
        let reg = self.league.settings.reg_season_count;
        let prior_mean: f64 = starters.iter().map(|p| p.weekly_baseline(reg)).sum();
        let prior_var: f64 = starters
            .iter()
            .map(|p| {
                let std = self.model.weekly_std(p);
                std * std
            })
            .sum();
        let prior_std = prior_var.sqrt();

        let observed = team.observed_scores();
        let observed_mean = if observed.is_empty() {
            0.0
        } else {
            observed.iter().sum::<f64>() / observed.len() as f64
        };
        let observed_std = match observed.len() {
            0 => prior_mean * 0.15,
            1 => observed[0].abs() * 0.20,
            n => {
                let variance = observed
                    .iter()
                    .map(|s| (s - observed_mean) * (s - observed_mean))
                    .sum::<f64>()
                    / (n - 1) as f64;
                variance.sqrt()
            }
        };

        let maturity = (observed.len() as f64 / OBSERVED_FULL_WEIGHT_WEEKS).min(1.0);
        let blend = self.sim.ratings_blend.clamp(0.0, 1.0) * maturity;

        let mean = blend * observed_mean + (1.0 - blend) * prior_mean;
        let stdev = (blend * observed_std + (1.0 - blend) * prior_std)
            .max(self.sim.score_variance_floor);
        TeamRating { mean, stdev }
    }

    /// Alpha-mode ratings: lineup scores from blended projections folded
    /// into the baseline ratings.
    pub fn team_ratings_with_alpha(
        &self,
        projections: &HashMap<u64, PlayerProjection>,
        alpha: &AlphaConfig,
    ) -> HashMap<u32, TeamRating> {
        let mut ratings = self.team_ratings();
        let blend = alpha.alpha_blend.clamp(0.0, 1.0);

        for team in &self.league.teams {
            let lineup = lineup::optimal_lineup(&team.roster, &self.slots, |p| {
                projections
                    .get(&p.player_id)
                    .map(|proj| proj.blended_mean)
                    .unwrap_or_else(|| p.weekly_baseline(self.league.settings.reg_season_count))
            });
            let lineup_mean: f64 = lineup
                .iter()
                .filter_map(|p| projections.get(&p.player_id))
                .map(|proj| proj.blended_mean)
                .sum();
            let lineup_var: f64 = lineup
                .iter()
                .filter_map(|p| projections.get(&p.player_id))
                .map(|proj| proj.uncertainty * proj.uncertainty)
                .sum();

            if let Some(rating) = ratings.get_mut(&team.team_id) {
                rating.mean = blend * lineup_mean + (1.0 - blend) * rating.mean;
                rating.stdev = (blend * lineup_var.sqrt() + (1.0 - blend) * rating.stdev)
                    .max(self.sim.score_variance_floor);
            }
        }
        ratings
    }

    // -----------------------------------------------------------------
    // Matchup simulation (player-level draws)
    // -----------------------------------------------------------------

    pub fn simulate_matchup(&self, team1_id: u32, team2_id: u32, week: u32) -> MatchupResult {
        let n = self.sim.num_simulations.max(1);
        let team1 = self
            .league
            .team(team1_id)
            .unwrap_or_else(|| &self.league.teams[0]);
        let team2 = self
            .league
            .team(team2_id)
            .unwrap_or_else(|| &self.league.teams[0]);
        let starters1 = self.starters(team1);
        let starters2 = self.starters(team2);

        let chunks = n.div_ceil(SIM_CHUNK);
        let root = self.root_seed(u64::from(week) << 32);

        let chunk_results: Vec<(Vec<f64>, Vec<f64>)> = (0..chunks)
            .into_par_iter()
            .map(|chunk| {
                let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(root, chunk as u64));
                let start = chunk * SIM_CHUNK;
                let count = SIM_CHUNK.min(n - start);
                let mut scores1 = Vec::with_capacity(count);
                let mut scores2 = Vec::with_capacity(count);
                for _ in 0..count {
                    scores1.push(self.draw_lineup_score(&starters1, &mut rng));
                    scores2.push(self.draw_lineup_score(&starters2, &mut rng));
                }
                (scores1, scores2)
            })
            .collect();

        let mut scores1 = Vec::with_capacity(n);
        let mut scores2 = Vec::with_capacity(n);
        for (chunk1, chunk2) in chunk_results {
            scores1.extend(chunk1);
            scores2.extend(chunk2);
        }

        let wins1 = scores1
            .iter()
            .zip(scores2.iter())
            .filter(|(a, b)| a > b)
            .count();

        let (mean1, std1) = mean_std(&scores1);
        let (mean2, std2) = mean_std(&scores2);

        MatchupResult {
            team1_id,
            team2_id,
            n_simulations: n,
            team1_win_probability: wins1 as f64 / n as f64 * 100.0,
            team2_win_probability: (n - wins1) as f64 / n as f64 * 100.0,
            team1_mean: mean1,
            team1_stdev: std1,
            team1_range: percentiles(&mut scores1),
            team2_mean: mean2,
            team2_stdev: std2,
            team2_range: percentiles(&mut scores2),
        }
    }

    fn draw_lineup_score(&self, starters: &[&Player], rng: &mut ChaCha8Rng) -> f64 {
        let reg = self.league.settings.reg_season_count;
        starters
            .iter()
            .map(|player| {
                if self.sim.use_gmm && self.model.has_model(player.player_id) {
                    self.model.predict(player, 1, true, rng)[0]
                } else {
                    let mean = player.weekly_baseline(reg);
                    let std = observed_weekly_std(player)
                        .unwrap_or_else(|| (mean * 0.25).max(2.0));
                    sample_normal(rng, mean, std).max(0.0)
                }
            })
            .sum()
    }

    // -----------------------------------------------------------------
    // Season + playoffs
    // -----------------------------------------------------------------

    /// Simulate every remaining matchup `num_simulations` times and
    /// aggregate per-team odds.
    pub fn run_simulations(&self, ratings: &HashMap<u32, TeamRating>) -> Vec<SeasonOdds> {
        let n = self.sim.num_simulations.max(1);
        let playoff_spots = self.league.settings.playoff_team_count.max(1);
        let base_wins: HashMap<u32, u32> = self
            .league
            .teams
            .iter()
            .map(|t| (t.team_id, t.wins()))
            .collect();
        let base_points: HashMap<u32, f64> = self
            .league
            .teams
            .iter()
            .map(|t| (t.team_id, t.points_for()))
            .collect();

        let chunks = n.div_ceil(SIM_CHUNK);
        let root = self.root_seed(0x5ea5_0000);

        #[derive(Default, Clone)]
        struct Tally {
            wins: f64,
            points: f64,
            playoffs: usize,
            championships: usize,
        }

        let chunk_tallies: Vec<HashMap<u32, Tally>> = (0..chunks)
            .into_par_iter()
            .map(|chunk| {
                let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(root, chunk as u64));
                let start = chunk * SIM_CHUNK;
                let count = SIM_CHUNK.min(n - start);
                let mut tally: HashMap<u32, Tally> = self
                    .league
                    .teams
                    .iter()
                    .map(|t| (t.team_id, Tally::default()))
                    .collect();

                for _ in 0..count {
                    let (wins, points) =
                        self.simulate_one_season(ratings, &base_wins, &base_points, &mut rng);
                    let seeds = playoff_seeds(&wins, &points, playoff_spots);
                    let champion = self.simulate_playoff_bracket(&seeds, ratings, &mut rng);

                    for team in &self.league.teams {
                        let entry = tally.get_mut(&team.team_id).unwrap();
                        entry.wins += f64::from(wins[&team.team_id]);
                        entry.points += points[&team.team_id];
                    }
                    for team_id in &seeds {
                        tally.get_mut(team_id).unwrap().playoffs += 1;
                    }
                    if let Some(champion) = champion {
                        tally.get_mut(&champion).unwrap().championships += 1;
                    }
                }
                tally
            })
            .collect();

        let mut merged: HashMap<u32, Tally> = self
            .league
            .teams
            .iter()
            .map(|t| (t.team_id, Tally::default()))
            .collect();
        for tally in chunk_tallies {
            for (team_id, t) in tally {
                let entry = merged.get_mut(&team_id).unwrap();
                entry.wins += t.wins;
                entry.points += t.points;
                entry.playoffs += t.playoffs;
                entry.championships += t.championships;
            }
        }

        let mut odds: Vec<SeasonOdds> = merged
            .into_iter()
            .map(|(team_id, t)| SeasonOdds {
                team_id,
                mean_wins: t.wins / n as f64,
                mean_points_for: t.points / n as f64,
                playoff_probability: t.playoffs as f64 / n as f64 * 100.0,
                championship_probability: t.championships as f64 / n as f64 * 100.0,
            })
            .collect();
        odds.sort_by_key(|o| o.team_id);
        odds
    }

    fn simulate_one_season(
        &self,
        ratings: &HashMap<u32, TeamRating>,
        base_wins: &HashMap<u32, u32>,
        base_points: &HashMap<u32, f64>,
        rng: &mut ChaCha8Rng,
    ) -> (HashMap<u32, u32>, HashMap<u32, f64>) {
        let mut wins = base_wins.clone();
        let mut points = base_points.clone();

        for game in &self.schedule {
            let score1 = draw_rating(ratings, game.team1_id, rng);
            let score2 = draw_rating(ratings, game.team2_id, rng);
            *points.get_mut(&game.team1_id).unwrap() += score1;
            *points.get_mut(&game.team2_id).unwrap() += score2;
            if score1 > score2 {
                *wins.get_mut(&game.team1_id).unwrap() += 1;
            } else {
                *wins.get_mut(&game.team2_id).unwrap() += 1;
            }
        }

        (wins, points)
    }

    /// Single-elimination bracket over the seeded field; the higher seed
    /// advances on an exact tie.
    fn simulate_playoff_bracket(
        &self,
        seeds: &[u32],
        ratings: &HashMap<u32, TeamRating>,
        rng: &mut ChaCha8Rng,
    ) -> Option<u32> {
        if seeds.len() < 2 {
            return seeds.first().copied();
        }
        let mut field: Vec<u32> = seeds.to_vec();
        while field.len() > 1 {
            let mut next = Vec::with_capacity(field.len().div_ceil(2));
            let rounds = field.len() / 2;
            for idx in 0..rounds {
                let high = field[idx];
                let low = field[field.len() - 1 - idx];
                let high_score = draw_rating(ratings, high, rng);
                let low_score = draw_rating(ratings, low, rng);
                next.push(if low_score > high_score { low } else { high });
            }
            if field.len() % 2 == 1 {
                next.insert(0, field[rounds]);
            }
            field = next;
        }
        field.first().copied()
    }

    // -----------------------------------------------------------------
    // Draft strategy comparison
    // -----------------------------------------------------------------

    pub fn analyze_draft_strategies(
        &self,
        ratings: &HashMap<u32, TeamRating>,
    ) -> Vec<StrategyReport> {
        let strategies: Vec<(&str, HashMap<Position, f64>)> = vec![
            (
                "Zero RB",
                position_weights(&[(Position::Rb, 0.1), (Position::Wr, 0.4), (Position::Te, 0.2), (Position::Qb, 0.2), (Position::K, 0.05), (Position::Def, 0.05)]),
            ),
            (
                "RB Heavy",
                position_weights(&[(Position::Rb, 0.4), (Position::Wr, 0.2), (Position::Te, 0.1), (Position::Qb, 0.2), (Position::K, 0.05), (Position::Def, 0.05)]),
            ),
            (
                "Balanced",
                position_weights(&[(Position::Rb, 0.25), (Position::Wr, 0.25), (Position::Te, 0.15), (Position::Qb, 0.25), (Position::K, 0.05), (Position::Def, 0.05)]),
            ),
        ];

        let iterations = (self.sim.num_simulations / 10).max(1);
        let playoff_spots = self.league.settings.playoff_team_count.max(1);
        let base_wins: HashMap<u32, u32> =
            self.league.teams.iter().map(|t| (t.team_id, 0)).collect();
        let base_points: HashMap<u32, f64> =
            self.league.teams.iter().map(|t| (t.team_id, 0.0)).collect();

        strategies
            .into_iter()
            .enumerate()
            .map(|(strategy_idx, (name, weights))| {
                // Each strategy works on its own copy of the ratings so
                // adjustments cannot bleed across comparisons.
                let adjusted = self.apply_strategy_weights(ratings.clone(), &weights);
                let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(
                    self.root_seed(0xd4af_7000),
                    strategy_idx as u64,
                ));

                let mut championships = 0;
                let mut rosters = Vec::new();
                for _ in 0..iterations {
                    let (wins, points) =
                        self.simulate_one_season(&adjusted, &base_wins, &base_points, &mut rng);
                    let seeds = playoff_seeds(&wins, &points, playoff_spots);
                    if let Some(champion) =
                        self.simulate_playoff_bracket(&seeds, &adjusted, &mut rng)
                    {
                        championships += 1;
                        if let Some(team) = self.league.team(champion) {
                            rosters.push(self.analyze_roster(team));
                        }
                    }
                }

                StrategyReport {
                    strategy: name.to_string(),
                    iterations,
                    championships,
                    championship_rosters: rosters,
                }
            })
            .collect()
    }

    fn apply_strategy_weights(
        &self,
        mut ratings: HashMap<u32, TeamRating>,
        weights: &HashMap<Position, f64>,
    ) -> HashMap<u32, TeamRating> {
        let reg = self.league.settings.reg_season_count;
        for team in &self.league.teams {
            let composition = roster_composition(&team.roster, reg);
            let strategy_match: f64 = composition
                .iter()
                .map(|(pos, share)| weights.get(pos).copied().unwrap_or(0.0) * share)
                .sum();
            // Bounded so no strategy turns a roster into an outlier.
            let factor = 0.75 + 0.5 * strategy_match;
            if let Some(rating) = ratings.get_mut(&team.team_id) {
                rating.mean *= factor;
            }
        }
        ratings
    }

    fn analyze_roster(&self, team: &Team) -> RosterAnalysis {
        let reg = self.league.settings.reg_season_count;
        let projections: Vec<f64> = team
            .roster
            .iter()
            .map(|p| p.weekly_baseline(reg))
            .filter(|v| *v > 0.0)
            .collect();
        let (mean, std) = mean_std(&projections);
        let star_cutoff = mean + std;
        let star_players = team
            .roster
            .iter()
            .filter(|p| p.weekly_baseline(reg) > star_cutoff)
            .count();

        let composition = roster_composition(&team.roster, reg)
            .into_iter()
            .map(|(pos, share)| (pos.as_str().to_string(), share))
            .collect();

        RosterAnalysis {
            composition,
            star_players,
            total_projection: projections.iter().sum(),
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn remaining_schedule(league: &LeagueContext) -> Vec<ScheduledMatchup> {
    let mut games = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let start_week = league.current_week.max(1);

    for team in &league.teams {
        for (idx, opponent_id) in team.schedule.iter().enumerate() {
            let week = idx as u32 + 1;
            if week < start_week {
                continue;
            }
            let outcome = team.outcomes.get(idx).copied().unwrap_or(Outcome::U);
            if outcome.is_decided() {
                continue;
            }
            if *opponent_id == team.team_id || league.team(*opponent_id).is_none() {
                continue;
            }
            let key = (
                week,
                team.team_id.min(*opponent_id),
                team.team_id.max(*opponent_id),
            );
            if seen.insert(key) {
                games.push(ScheduledMatchup {
                    week,
                    team1_id: key.1,
                    team2_id: key.2,
                });
            }
        }
    }

    games.sort_by_key(|g| (g.week, g.team1_id, g.team2_id));
    games
}

fn draw_rating(ratings: &HashMap<u32, TeamRating>, team_id: u32, rng: &mut ChaCha8Rng) -> f64 {
    let rating = ratings
        .get(&team_id)
        .copied()
        .unwrap_or(TeamRating { mean: 90.0, stdev: 15.0 });
    sample_normal(rng, rating.mean, rating.stdev).max(0.0)
}

/// Seed order: wins, then total points-for as the league tie rule.
fn playoff_seeds(
    wins: &HashMap<u32, u32>,
    points: &HashMap<u32, f64>,
    spots: usize,
) -> Vec<u32> {
    let mut order: Vec<u32> = wins.keys().copied().collect();
    order.sort_by(|a, b| {
        wins[b]
            .cmp(&wins[a])
            .then_with(|| {
                points[b]
                    .partial_cmp(&points[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.cmp(b))
    });
    order.truncate(spots);
    order
}

fn roster_composition(roster: &[Player], reg_games: u32) -> HashMap<Position, f64> {
    let mut composition: HashMap<Position, f64> = HashMap::new();
    let mut total = 0.0;
    for player in roster {
        let value = player.weekly_baseline(reg_games);
        if value <= 0.0 {
            continue;
        }
        *composition.entry(player.position).or_insert(0.0) += value;
        total += value;
    }
    if total > 0.0 {
        for value in composition.values_mut() {
            *value /= total;
        }
    }
    composition
}

fn position_weights(pairs: &[(Position, f64)]) -> HashMap<Position, f64> {
    pairs.iter().copied().collect()
}

fn mix_seed(root: u64, stream: u64) -> u64 {
    // splitmix64 finalizer over (root, stream).
    let mut z = root ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Sample stdev of a player's scored weeks, when there are enough of them to
/// say anything.
fn observed_weekly_std(player: &Player) -> Option<f64> {
    let scores: Vec<f64> = player
        .stats
        .values()
        .map(|s| s.points)
        .filter(|p| *p > 0.0)
        .collect();
    if scores.len() < 2 {
        return None;
    }
    let (_, std) = mean_std(&scores);
    Some(std.max(1.0))
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
        / (values.len() - 1) as f64;
    (mean, variance.sqrt())
}

/// (p10, p50, p90) of a score sample.
fn percentiles(values: &mut [f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pick = |q: f64| {
        let rank = (q * (values.len() - 1) as f64).round() as usize;
        values[rank.min(values.len() - 1)]
    };
    (pick(0.10), pick(0.50), pick(0.90))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::LeagueSettings;
    use std::collections::BTreeMap;

    fn roster_of(base_id: u64, means: &[(Position, f64)]) -> Vec<Player> {
        means
            .iter()
            .enumerate()
            .map(|(idx, (position, mean))| Player {
                player_id: base_id + idx as u64,
                name: format!("P{}", base_id + idx as u64),
                position: *position,
                pro_team: String::new(),
                stats: BTreeMap::new(),
                schedule: BTreeMap::new(),
                injury_status: None,
                active: true,
                percent_started: 50.0,
                percent_owned: 50.0,
                projected_avg_points: *mean,
                projected_total_points: 0.0,
                avg_points: *mean,
                lineup_slot: None,
            })
            .collect()
    }

    fn standard_roster(base_id: u64, scale: f64) -> Vec<Player> {
        roster_of(
            base_id,
            &[
                (Position::Qb, 18.0 * scale),
                (Position::Rb, 14.0 * scale),
                (Position::Rb, 12.0 * scale),
                (Position::Wr, 13.0 * scale),
                (Position::Wr, 11.0 * scale),
                (Position::Te, 9.0 * scale),
                (Position::Wr, 8.0 * scale),
                (Position::K, 8.0 * scale),
                (Position::Def, 7.0 * scale),
            ],
        )
    }

    fn league_two_teams() -> LeagueContext {
        LeagueContext {
            league_id: 5,
            year: 2025,
            current_week: 1,
            settings: LeagueSettings {
                reg_season_count: 4,
                playoff_team_count: 2,
                ..LeagueSettings::default()
            },
            teams: vec![
                Team {
                    team_id: 1,
                    team_name: "Strong".to_string(),
                    division: String::new(),
                    roster: standard_roster(100, 1.2),
                    schedule: vec![2, 2, 2, 2],
                    scores: vec![None; 4],
                    outcomes: vec![Outcome::U; 4],
                    acquisitions: 0,
                    drops: 0,
                    trades: 0,
                },
                Team {
                    team_id: 2,
                    team_name: "Weak".to_string(),
                    division: String::new(),
                    roster: standard_roster(200, 0.8),
                    schedule: vec![1, 1, 1, 1],
                    scores: vec![None; 4],
                    outcomes: vec![Outcome::U; 4],
                    acquisitions: 0,
                    drops: 0,
                    trades: 0,
                },
            ],
            free_agents: Vec::new(),
            box_scores: BTreeMap::new(),
        }
    }

    fn store(tag: &str) -> PlayerModelStore {
        let dir = std::env::temp_dir().join(format!("gridiron_mc_{tag}"));
        let _ = std::fs::remove_dir_all(&dir);
        PlayerModelStore::open(dir, 24).unwrap()
    }

    fn sim_config(n: usize, seed: u64) -> SimulationConfig {
        SimulationConfig {
            num_simulations: n,
            seed: Some(seed),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn stronger_team_wins_more_matchups() {
        let league = league_two_teams();
        let model = store("matchup");
        let sim = sim_config(2000, 42);
        let engine = MonteCarloEngine::new(&league, &model, &sim);
        let result = engine.simulate_matchup(1, 2, 1);
        assert!(result.team1_win_probability > 70.0);
        assert!(
            (result.team1_win_probability + result.team2_win_probability - 100.0).abs() < 1e-9
        );
        assert!(result.team1_range.0 <= result.team1_range.1);
        assert!(result.team1_range.1 <= result.team1_range.2);
    }

    #[test]
    fn identical_seeds_reproduce_bitwise_results() {
        let league = league_two_teams();
        let model = store("repro");
        let sim = sim_config(1500, 7);
        let engine = MonteCarloEngine::new(&league, &model, &sim);
        let ratings = engine.team_ratings();

        let a = engine.run_simulations(&ratings);
        let b = engine.run_simulations(&ratings);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.team_id, y.team_id);
            assert_eq!(x.mean_wins.to_bits(), y.mean_wins.to_bits());
            assert_eq!(
                x.playoff_probability.to_bits(),
                y.playoff_probability.to_bits()
            );
            assert_eq!(
                x.championship_probability.to_bits(),
                y.championship_probability.to_bits()
            );
        }
    }

    #[test]
    fn season_probabilities_are_coherent() {
        let league = league_two_teams();
        let model = store("season");
        let sim = sim_config(800, 11);
        let engine = MonteCarloEngine::new(&league, &model, &sim);
        let ratings = engine.team_ratings();
        let odds = engine.run_simulations(&ratings);

        let playoff_total: f64 = odds.iter().map(|o| o.playoff_probability).sum();
        let champ_total: f64 = odds.iter().map(|o| o.championship_probability).sum();
        // Two teams, two playoff spots: everyone makes it, one champion.
        assert!((playoff_total - 200.0).abs() < 1e-9);
        assert!((champ_total - 100.0).abs() < 1e-6);

        let strong = odds.iter().find(|o| o.team_id == 1).unwrap();
        let weak = odds.iter().find(|o| o.team_id == 2).unwrap();
        assert!(strong.championship_probability > weak.championship_probability);
        assert!(strong.mean_wins > weak.mean_wins);
    }

    #[test]
    fn decided_weeks_are_not_resimulated() {
        let mut league = league_two_teams();
        league.current_week = 3;
        league.teams[0].outcomes = vec![Outcome::W, Outcome::W, Outcome::U, Outcome::U];
        league.teams[0].scores = vec![Some(120.0), Some(110.0), None, None];
        league.teams[1].outcomes = vec![Outcome::L, Outcome::L, Outcome::U, Outcome::U];
        league.teams[1].scores = vec![Some(90.0), Some(95.0), None, None];

        let model = store("decided");
        let sim = sim_config(300, 3);
        let engine = MonteCarloEngine::new(&league, &model, &sim);
        assert_eq!(engine.schedule.len(), 2);
        let ratings = engine.team_ratings();
        let odds = engine.run_simulations(&ratings);
        let strong = odds.iter().find(|o| o.team_id == 1).unwrap();
        // Two banked wins plus at most two simulated ones.
        assert!(strong.mean_wins >= 2.0 && strong.mean_wins <= 4.0);
    }

    #[test]
    fn strategy_reports_cover_all_presets() {
        let league = league_two_teams();
        let model = store("strategy");
        let sim = sim_config(200, 9);
        let engine = MonteCarloEngine::new(&league, &model, &sim);
        let ratings = engine.team_ratings();
        let reports = engine.analyze_draft_strategies(&ratings);
        assert_eq!(reports.len(), 3);
        for report in &reports {
            assert_eq!(report.iterations, 20);
            assert!(report.championships <= report.iterations);
        }
    }
}
