use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed record model for the league collaborator boundary.
///
/// Upstream hands us loosely-shaped payloads; everything is normalized into
/// these records once, at the edge, so the rest of the crate never does
/// defensive field access.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "QB")]
    Qb,
    #[serde(rename = "RB")]
    Rb,
    #[serde(rename = "WR")]
    Wr,
    #[serde(rename = "TE")]
    Te,
    #[serde(rename = "K")]
    K,
    #[serde(rename = "DEF")]
    Def,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Qb => "QB",
            Position::Rb => "RB",
            Position::Wr => "WR",
            Position::Te => "TE",
            Position::K => "K",
            Position::Def => "DEF",
        }
    }

    pub fn parse(raw: &str) -> Option<Position> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QB" => Some(Position::Qb),
            "RB" => Some(Position::Rb),
            "WR" => Some(Position::Wr),
            "TE" => Some(Position::Te),
            "K" => Some(Position::K),
            "DEF" | "D/ST" | "DST" => Some(Position::Def),
            _ => None,
        }
    }

    pub const ALL: [Position; 6] = [
        Position::Qb,
        Position::Rb,
        Position::Wr,
        Position::Te,
        Position::K,
        Position::Def,
    ];

    /// Positions whose weekly output is meaningfully shaped by the opposing
    /// defense. K and DEF stay at a neutral multiplier.
    pub fn is_dvp_tracked(&self) -> bool {
        matches!(
            self,
            Position::Qb | Position::Rb | Position::Wr | Position::Te
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjuryStatus {
    Active,
    Normal,
    Out,
    Questionable,
    Doubtful,
    InjuryReserve,
    Suspension,
    DayToDay,
}

impl InjuryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjuryStatus::Active => "ACTIVE",
            InjuryStatus::Normal => "NORMAL",
            InjuryStatus::Out => "OUT",
            InjuryStatus::Questionable => "QUESTIONABLE",
            InjuryStatus::Doubtful => "DOUBTFUL",
            InjuryStatus::InjuryReserve => "INJURY_RESERVE",
            InjuryStatus::Suspension => "SUSPENSION",
            InjuryStatus::DayToDay => "DAY_TO_DAY",
        }
    }

    /// Uppercases and keeps the full token; unknown tokens map to `None`
    /// rather than failing the whole record.
    pub fn parse(raw: &str) -> Option<InjuryStatus> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(InjuryStatus::Active),
            "NORMAL" => Some(InjuryStatus::Normal),
            "OUT" => Some(InjuryStatus::Out),
            "QUESTIONABLE" | "Q" => Some(InjuryStatus::Questionable),
            "DOUBTFUL" | "D" => Some(InjuryStatus::Doubtful),
            "INJURY_RESERVE" | "IR" => Some(InjuryStatus::InjuryReserve),
            "SUSPENSION" | "SUSP" => Some(InjuryStatus::Suspension),
            "DAY_TO_DAY" => Some(InjuryStatus::DayToDay),
            _ => None,
        }
    }

    /// Whitelist used by the free-agent filter: only explicitly healthy
    /// statuses pass. A missing status also counts as healthy at call sites.
    pub fn is_healthy(&self) -> bool {
        matches!(self, InjuryStatus::Active | InjuryStatus::Normal)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyStat {
    pub points: f64,
    #[serde(default)]
    pub projected_points: f64,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
}

/// One scheduled pro game for a player: who the offense faces and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub opponent: String,
    pub kickoff: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub player_id: u64,
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub pro_team: String,
    /// Weekly scoring history keyed by scoring period (1-based).
    #[serde(default)]
    pub stats: BTreeMap<u32, WeeklyStat>,
    /// Pro schedule keyed by week.
    #[serde(default)]
    pub schedule: BTreeMap<u32, ScheduledGame>,
    #[serde(default)]
    pub injury_status: Option<InjuryStatus>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub percent_started: f64,
    #[serde(default)]
    pub percent_owned: f64,
    #[serde(default)]
    pub projected_avg_points: f64,
    #[serde(default)]
    pub projected_total_points: f64,
    #[serde(default)]
    pub avg_points: f64,
    /// Current roster slot ("QB", "BE", "IR", ...) if the team has set one.
    #[serde(default)]
    pub lineup_slot: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Player {
    /// ESPN-style weekly baseline: projected average, else projected total
    /// spread over the regular season, else observed average.
    pub fn weekly_baseline(&self, reg_season_weeks: u32) -> f64 {
        if self.projected_avg_points > 0.0 {
            return self.projected_avg_points;
        }
        if self.projected_total_points > 0.0 {
            return self.projected_total_points / f64::from(reg_season_weeks.max(1));
        }
        self.avg_points.max(0.0)
    }

    /// Actual points up to and including `through_week`, newest first.
    pub fn recent_points(&self, through_week: u32) -> Vec<f64> {
        let mut rows: Vec<(u32, f64)> = self
            .stats
            .iter()
            .filter(|(week, _)| **week >= 1 && **week <= through_week)
            .map(|(week, stat)| (*week, stat.points))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter().map(|(_, points)| points).collect()
    }

    pub fn is_current_starter(&self) -> bool {
        match self.lineup_slot.as_deref() {
            None | Some("") => false,
            Some(slot) => {
                let slot = slot.to_ascii_uppercase();
                slot != "BE" && slot != "BENCH" && slot != "IR" && slot != "FA"
            }
        }
    }

    pub fn status_token(&self) -> &'static str {
        self.injury_status.map(|s| s.as_str()).unwrap_or("")
    }
}

/// A lineup entry in a historical box score. Week-specific fields ride next
/// to the player record instead of subclassing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyLineupEntry {
    pub player: Player,
    pub slot: String,
    pub week_points: f64,
    #[serde(default)]
    pub week_projected: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    W,
    L,
    T,
    U,
}

impl Outcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Outcome::U)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_id: u32,
    pub team_name: String,
    #[serde(default)]
    pub division: String,
    pub roster: Vec<Player>,
    /// Opponent team ids by week, index 0 = week 1.
    pub schedule: Vec<u32>,
    pub scores: Vec<Option<f64>>,
    pub outcomes: Vec<Outcome>,
    #[serde(default)]
    pub acquisitions: u32,
    #[serde(default)]
    pub drops: u32,
    #[serde(default)]
    pub trades: u32,
}

impl Team {
    pub fn wins(&self) -> u32 {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::W))
            .count() as u32
    }

    pub fn points_for(&self) -> f64 {
        self.scores.iter().flatten().sum()
    }

    /// Scores for decided weeks only.
    pub fn observed_scores(&self) -> Vec<f64> {
        self.scores
            .iter()
            .zip(self.outcomes.iter())
            .filter_map(|(score, outcome)| {
                if outcome.is_decided() { *score } else { None }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub reg_season_count: u32,
    pub playoff_team_count: usize,
    #[serde(default = "default_lineup_slots")]
    pub lineup_slots: Vec<String>,
    #[serde(default)]
    pub scoring_format_id: String,
}

pub fn default_lineup_slots() -> Vec<String> {
    ["QB", "RB", "RB", "WR", "WR", "TE", "FLEX", "K", "DEF"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LeagueSettings {
    fn default() -> Self {
        Self {
            reg_season_count: 14,
            playoff_team_count: 4,
            lineup_slots: default_lineup_slots(),
            scoring_format_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxScore {
    pub week: u32,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_score: f64,
    pub away_score: f64,
    #[serde(default)]
    pub home_lineup: Vec<WeeklyLineupEntry>,
    #[serde(default)]
    pub away_lineup: Vec<WeeklyLineupEntry>,
}

/// Immutable snapshot of a league as hydrated by the upstream collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueContext {
    pub league_id: u64,
    pub year: i32,
    pub current_week: u32,
    pub settings: LeagueSettings,
    pub teams: Vec<Team>,
    #[serde(default)]
    pub free_agents: Vec<Player>,
    #[serde(default)]
    pub box_scores: BTreeMap<u32, Vec<BoxScore>>,
}

impl LeagueContext {
    pub fn team(&self, team_id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn player_name(&self, player_id: u64) -> Option<&str> {
        self.all_players()
            .find(|p| p.player_id == player_id)
            .map(|p| p.name.as_str())
    }

    pub fn player_id(&self, name: &str) -> Option<u64> {
        self.all_players()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.player_id)
    }

    pub fn all_players(&self) -> impl Iterator<Item = &Player> {
        self.teams
            .iter()
            .flat_map(|t| t.roster.iter())
            .chain(self.free_agents.iter())
    }

    /// Last week of the fantasy regular season (inclusive ROS horizon end).
    pub fn reg_season_final_week(&self) -> u32 {
        self.settings.reg_season_count
    }
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("team {team_id}: duplicate player id {player_id} on roster")]
    DuplicateRosterId { team_id: u32, player_id: u64 },

    #[error("player {player_id} week {week}: negative points {points}")]
    NegativePoints {
        player_id: u64,
        week: u32,
        points: f64,
    },

    #[error("team {team_id}: schedule has {got} weeks, league plays {expected}")]
    ScheduleLength {
        team_id: u32,
        got: usize,
        expected: usize,
    },

    #[error("team {team_id} week {week}: score/outcome mismatch")]
    ScoreOutcomeMismatch { team_id: u32, week: u32 },
}

/// Boundary validation. Runs once per hydration; any violation aborts the
/// operation with enough detail to locate the offending record.
pub fn validate_league(league: &LeagueContext) -> Result<(), IntegrityError> {
    let total_weeks = league
        .teams
        .iter()
        .map(|t| t.schedule.len())
        .max()
        .unwrap_or(0);

    for team in &league.teams {
        let mut seen = std::collections::HashSet::new();
        for player in &team.roster {
            if !seen.insert(player.player_id) {
                return Err(IntegrityError::DuplicateRosterId {
                    team_id: team.team_id,
                    player_id: player.player_id,
                });
            }
            for (week, stat) in &player.stats {
                if stat.points < 0.0 {
                    return Err(IntegrityError::NegativePoints {
                        player_id: player.player_id,
                        week: *week,
                        points: stat.points,
                    });
                }
            }
        }

        if total_weeks > 0 && team.schedule.len() != total_weeks {
            return Err(IntegrityError::ScheduleLength {
                team_id: team.team_id,
                got: team.schedule.len(),
                expected: total_weeks,
            });
        }

        for (idx, outcome) in team.outcomes.iter().enumerate() {
            let score = team.scores.get(idx).copied().flatten();
            let decided = outcome.is_decided();
            if decided != score.is_some() {
                return Err(IntegrityError::ScoreOutcomeMismatch {
                    team_id: team.team_id,
                    week: idx as u32 + 1,
                });
            }
        }
    }

    Ok(())
}
