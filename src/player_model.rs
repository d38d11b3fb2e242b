// Per-player performance models: a three-state Gaussian mixture per
// (player, season), trained from weekly scoring history and cached on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::gmm::{self, Mixture};
use crate::league::{Player, Position};

pub const ARTIFACT_SCHEMA_VERSION: u32 = 2;

/// Minimum scored weeks before a mixture is worth fitting.
pub const MIN_TRAINING_WEEKS: usize = 5;

/// Probability that a state-biased draw comes from the current state's
/// component rather than the full mixture.
const STATE_BIAS: f64 = 0.70;

/// Floor for the fallback sampling stdev of untrained players.
const FALLBACK_STD_FLOOR: f64 = 3.0;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("player {player_id}: {weeks} scored weeks, need at least {MIN_TRAINING_WEEKS}")]
    InsufficientData { player_id: u64, weeks: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    Cold,
    Normal,
    Hot,
}

impl StateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateLabel::Cold => "cold",
            StateLabel::Normal => "normal",
            StateLabel::Hot => "hot",
        }
    }

    fn from_component(idx: usize) -> StateLabel {
        match idx {
            0 => StateLabel::Cold,
            2 => StateLabel::Hot,
            _ => StateLabel::Normal,
        }
    }

    pub fn component_index(&self) -> usize {
        match self {
            StateLabel::Cold => 0,
            StateLabel::Normal => 1,
            StateLabel::Hot => 2,
        }
    }
}

/// On-disk artifact, one per (player, season). Opaque to every other module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub schema_version: u32,
    pub player_id: u64,
    pub year: i32,
    pub position: Position,
    pub mixture: Mixture,
    pub current_state: StateLabel,
    pub season_mean: f64,
    pub season_std: f64,
    /// Mean of the last three scored weeks.
    pub recent_form_mean: f64,
    pub observed_weeks: usize,
    pub trained_at: DateTime<Utc>,
    /// Set when EM degenerated and the moment fallback was stored instead.
    #[serde(default)]
    pub numeric_fallback: bool,
}

#[derive(Debug, Default)]
pub struct BulkTrainReport {
    pub trained: Vec<u64>,
    pub loaded_from_cache: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

/// Owns the cache directory and every in-memory PlayerState. Training is the
/// only mutation path; sampling is read-only.
#[derive(Debug)]
pub struct PlayerModelStore {
    cache_dir: PathBuf,
    ttl: Duration,
    states: HashMap<u64, PlayerState>,
}

impl PlayerModelStore {
    pub fn open(cache_dir: impl Into<PathBuf>, cache_ttl_hours: u64) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("create model cache dir {}", cache_dir.display()))?;
        Ok(Self {
            cache_dir,
            ttl: Duration::from_secs(cache_ttl_hours.saturating_mul(3600)),
            states: HashMap::new(),
        })
    }

    pub fn state_of(&self, player_id: u64) -> Option<&PlayerState> {
        self.states.get(&player_id)
    }

    pub fn has_model(&self, player_id: u64) -> bool {
        self.states.contains_key(&player_id)
    }

    /// Train from scratch, overwriting any cached artifact.
    pub fn train(&mut self, player: &Player, year: i32) -> Result<&PlayerState, TrainError> {
        let state = train_state(player, year)?;
        self.persist(&state);
        self.states.insert(player.player_id, state);
        Ok(&self.states[&player.player_id])
    }

    /// Cache hit requires: artifact present, mtime within TTL, schema version
    /// and season match. Anything else retrains transparently.
    pub fn load_or_train(&mut self, player: &Player, year: i32) -> Result<&PlayerState, TrainError> {
        if self.states.contains_key(&player.player_id) {
            return Ok(&self.states[&player.player_id]);
        }
        if let Some(state) = load_cached_state(
            &self.artifact_path(player.player_id, year),
            self.ttl,
            year,
        ) {
            self.states.insert(player.player_id, state);
            return Ok(&self.states[&player.player_id]);
        }
        self.train(player, year)
    }

    /// Train many players, one job each. Per-player failures are collected
    /// and never abort the batch.
    pub fn bulk_train(&mut self, players: &[Player], year: i32) -> BulkTrainReport {
        let cache_dir = self.cache_dir.clone();
        let ttl = self.ttl;

        let rows: Vec<(u64, std::result::Result<(PlayerState, bool), TrainError>)> = players
            .par_iter()
            .map(|player| {
                let path = artifact_path_in(&cache_dir, player.player_id, year);
                if let Some(state) = load_cached_state(&path, ttl, year) {
                    return (player.player_id, Ok((state, true)));
                }
                let result = train_state(player, year).map(|state| (state, false));
                (player.player_id, result)
            })
            .collect();

        let mut report = BulkTrainReport::default();
        for (player_id, row) in rows {
            match row {
                Ok((state, from_cache)) => {
                    if from_cache {
                        report.loaded_from_cache.push(player_id);
                    } else {
                        self.persist(&state);
                        report.trained.push(player_id);
                    }
                    self.states.insert(player_id, state);
                }
                Err(err) => {
                    debug!(player_id, %err, "training skipped");
                    report.failed.push((player_id, err.to_string()));
                }
            }
        }
        report
    }

    /// Draw `n` weekly scores for a player. Trained players sample the
    /// mixture (state-biased by default); everyone else falls back to a
    /// shifted normal around their projection. Never fails, never negative.
    pub fn predict(
        &self,
        player: &Player,
        n: usize,
        state_biased: bool,
        rng: &mut ChaCha8Rng,
    ) -> Vec<f64> {
        let mut out = Vec::with_capacity(n);
        match self.states.get(&player.player_id) {
            Some(state) => {
                let current = state.current_state.component_index();
                for _ in 0..n {
                    let draw = if state_biased && rng.r#gen::<f64>() < STATE_BIAS {
                        state.mixture.sample_component(current, rng)
                    } else {
                        state.mixture.sample(rng)
                    };
                    out.push(draw.max(0.0));
                }
            }
            None => {
                let mean = player.weekly_baseline(14).max(0.0);
                let std = self.fallback_std(player.position);
                for _ in 0..n {
                    out.push(gmm::sample_normal(rng, mean, std).max(0.0));
                }
            }
        }
        out
    }

    /// Per-game stdev used for team ratings: season stdev when trained,
    /// otherwise a projection-scaled guess.
    pub fn weekly_std(&self, player: &Player) -> f64 {
        match self.states.get(&player.player_id) {
            Some(state) => state.season_std.max(1.0),
            None => (player.weekly_baseline(14) * 0.25).max(2.0),
        }
    }

    /// Average trained stdev at a position, floored for sampling stability.
    pub fn fallback_std(&self, position: Position) -> f64 {
        let stds: Vec<f64> = self
            .states
            .values()
            .filter(|s| s.position == position)
            .map(|s| s.season_std)
            .collect();
        if stds.is_empty() {
            return FALLBACK_STD_FLOOR;
        }
        let avg = stds.iter().sum::<f64>() / stds.len() as f64;
        avg.max(FALLBACK_STD_FLOOR)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn artifact_path(&self, player_id: u64, year: i32) -> PathBuf {
        artifact_path_in(&self.cache_dir, player_id, year)
    }

    fn persist(&self, state: &PlayerState) {
        let path = self.artifact_path(state.player_id, state.year);
        if let Err(err) = write_artifact(&path, state) {
            // A failed cache write costs a retrain later, nothing else.
            warn!(player_id = state.player_id, %err, "model cache write failed");
        }
    }
}

fn artifact_path_in(cache_dir: &Path, player_id: u64, year: i32) -> PathBuf {
    cache_dir.join(format!("player_{player_id}_{year}.json"))
}

fn write_artifact(path: &Path, state: &PlayerState) -> Result<()> {
    let json = serde_json::to_string(state).context("serialize player state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn load_cached_state(path: &Path, ttl: Duration, year: i32) -> Option<PlayerState> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    let age = SystemTime::now().duration_since(mtime).ok()?;
    if age > ttl {
        return None;
    }
    let raw = fs::read_to_string(path).ok()?;
    let state: PlayerState = serde_json::from_str(&raw).ok()?;
    if state.schema_version != ARTIFACT_SCHEMA_VERSION || state.year != year {
        return None;
    }
    Some(state)
}

/// Deterministic training seed from (player, season).
fn train_seed(player_id: u64, year: i32) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in player_id
        .to_le_bytes()
        .iter()
        .chain((year as i64).to_le_bytes().iter())
    {
        h ^= u64::from(*byte);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

/// Pure training path: weekly positive scores up to the season cut, EM fit,
/// state detection from the last three scored weeks.
pub fn train_state(player: &Player, year: i32) -> Result<PlayerState, TrainError> {
    let mut scored: Vec<(u32, f64)> = player
        .stats
        .iter()
        .filter(|(week, stat)| **week >= 1 && stat.points > 0.0)
        .map(|(week, stat)| (*week, stat.points))
        .collect();
    scored.sort_by_key(|(week, _)| *week);
    let scores: Vec<f64> = scored.iter().map(|(_, points)| *points).collect();

    if scores.len() < MIN_TRAINING_WEEKS {
        return Err(TrainError::InsufficientData {
            player_id: player.player_id,
            weeks: scores.len(),
        });
    }

    let outcome = gmm::fit(&scores, train_seed(player.player_id, year));
    if outcome.degraded {
        warn!(
            player_id = player.player_id,
            "mixture fit degenerated; stored moment fallback"
        );
    }

    let (season_mean, season_var) = gmm::moments(&scores);
    let recent: Vec<f64> = scores.iter().rev().take(3).copied().collect();
    let recent_form_mean = if recent.is_empty() {
        season_mean
    } else {
        recent.iter().sum::<f64>() / recent.len() as f64
    };

    // The current state is the mixture component with the highest posterior
    // at the recent-form mean, not a season-sigma band around the mean.
    let current_state = if recent.is_empty() {
        StateLabel::Normal
    } else {
        StateLabel::from_component(outcome.mixture.most_likely_component(recent_form_mean))
    };

    Ok(PlayerState {
        schema_version: ARTIFACT_SCHEMA_VERSION,
        player_id: player.player_id,
        year,
        position: player.position,
        mixture: outcome.mixture,
        current_state,
        season_mean,
        season_std: season_var.sqrt(),
        recent_form_mean,
        observed_weeks: scores.len(),
        trained_at: Utc::now(),
        numeric_fallback: outcome.degraded,
    })
}
