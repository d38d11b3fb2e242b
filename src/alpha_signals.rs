// Composite alpha signal provider.
//
// Fuses league state with external feed envelopes into one bounded
// per-player adjustment. Each signal is a pure function of (player features,
// league context, feed data) with its own clip range; any failure inside a
// signal or a feed degrades that signal to neutral, never the provider.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::{AlphaConfig, RuntimeConfig};
use crate::feeds::{
    FEED_NAMES, FLAG_FEED_UNAVAILABLE, FeedAdapter, FeedEnvelope, sanitize_envelope,
};
use crate::league::{LeagueContext, Player, Position, Team};
use crate::snapshot::SnapshotStore;

pub const BASE_SIGNALS: [&str; 10] = [
    "projection_residual",
    "usage_trend",
    "injury_opportunity",
    "matchup_unit",
    "game_script",
    "volatility_aware",
    "weather_venue",
    "market_sentiment_contrarian",
    "waiver_replacement_value",
    "short_term_schedule_cluster",
];

pub const EXTENDED_SIGNALS: [&str; 7] = [
    "player_tilt_leverage",
    "vegas_props",
    "win_probability_script",
    "backup_quality_adjustment",
    "red_zone_opportunity",
    "snap_count_percentage",
    "line_movement",
];

pub const MATCHUP_MULTIPLIER_RANGE: (f64, f64) = (0.85, 1.15);

/// Pro teams that play indoors; used when the weather feed is live but has
/// no reading for a team.
static DOME_TEAMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["ATL", "DAL", "DET", "HOU", "IND", "LV", "MIN", "NO"]
        .into_iter()
        .collect()
});

/// Default clip range per signal, points.
fn default_cap(signal: &str) -> (f64, f64) {
    match signal {
        "projection_residual" => (-2.5, 2.5),
        "usage_trend" => (-2.0, 2.0),
        "injury_opportunity" => (-3.0, 2.0),
        "matchup_unit" => (-1.5, 1.5),
        "game_script" => (-1.0, 1.0),
        "volatility_aware" => (-1.0, 0.5),
        "weather_venue" => (-1.5, 0.5),
        "market_sentiment_contrarian" => (-1.2, 1.2),
        "waiver_replacement_value" => (-1.0, 1.5),
        "short_term_schedule_cluster" => (-1.0, 1.0),
        "player_tilt_leverage" => (-1.5, 1.5),
        "vegas_props" => (-2.0, 2.0),
        "win_probability_script" => (-1.5, 1.5),
        "backup_quality_adjustment" => (-0.5, 0.5),
        "red_zone_opportunity" => (-0.5, 0.8),
        "snap_count_percentage" => (-0.5, 0.5),
        "line_movement" => (-1.0, 1.0),
        _ => (-1.0, 1.0),
    }
}

/// Fixed per-signal variance fed into the blend-layer uncertainty term.
fn signal_variance(signal: &str) -> f64 {
    match signal {
        "projection_residual" | "vegas_props" => 0.60,
        "usage_trend" | "market_sentiment_contrarian" | "player_tilt_leverage" => 0.45,
        "injury_opportunity" | "win_probability_script" => 0.50,
        _ => 0.30,
    }
}

fn feed_for_signal(signal: &str) -> Option<&'static str> {
    match signal {
        "projection_residual" | "usage_trend" | "market_sentiment_contrarian"
        | "player_tilt_leverage" => Some("market"),
        "matchup_unit" | "game_script" | "short_term_schedule_cluster" | "vegas_props"
        | "win_probability_script" | "line_movement" => Some("odds"),
        "weather_venue" => Some("weather"),
        "injury_opportunity" | "backup_quality_adjustment" => Some("injury_news"),
        "volatility_aware" | "red_zone_opportunity" | "snap_count_percentage" => {
            Some("nextgenstats")
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalContribution {
    pub signal: String,
    pub raw: f64,
    pub clipped: f64,
    pub weight: f64,
    pub weighted: f64,
    pub confidence: f64,
    pub source: String,
    pub quality_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaAdjustment {
    pub player_id: u64,
    pub position: Position,
    pub delta_mean_points: f64,
    pub delta_stdev_points: f64,
    pub matchup_multiplier: f64,
    pub injury_status: String,
    /// Ordered by signal priority; decision factors rely on this order.
    pub contributions: Vec<SignalContribution>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub players_evaluated: usize,
    pub players_with_non_zero_alpha: usize,
    pub cap_hits_total_adjustment: usize,
    pub quality_flags: BTreeSet<String>,
    pub active_signals: Vec<String>,
    pub extended_signals_enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WeekPayload {
    pub adjustments: HashMap<u64, AlphaAdjustment>,
    pub injury_overrides: HashMap<u64, String>,
    pub warnings: Vec<String>,
    pub summary: ProviderSummary,
}

struct CachedPayload {
    key: (u64, i32, u32, Option<DateTime<Utc>>),
    built_at: Instant,
    payload: Arc<WeekPayload>,
}

/// Online provider with graceful degradation and queryable diagnostics.
pub struct CompositeSignalProvider {
    alpha: AlphaConfig,
    runtime: RuntimeConfig,
    adapters: HashMap<String, Box<dyn FeedAdapter>>,
    snapshots: Option<Arc<SnapshotStore>>,
    cache: Option<CachedPayload>,
}

impl CompositeSignalProvider {
    pub fn new(alpha: AlphaConfig, runtime: RuntimeConfig) -> Self {
        Self {
            alpha,
            runtime,
            adapters: HashMap::new(),
            snapshots: None,
            cache: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn FeedAdapter>) -> Self {
        self.adapters.insert(adapter.feed_name().to_string(), adapter);
        self
    }

    /// Attach a snapshot store: live fetches are journaled through it and
    /// as-of lookups replay from it.
    pub fn with_snapshot_store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Per-player adjustments for a week, using the runtime as-of cutoff if
    /// one is configured. Cached per (league, year, week, cutoff) under
    /// `cache_ttl_seconds`.
    pub fn week_payload(&mut self, league: &LeagueContext, week: u32) -> Arc<WeekPayload> {
        let cutoff = self.runtime.as_of_cutoff();
        self.week_payload_with_cutoff(league, week, cutoff)
    }

    pub fn week_payload_with_cutoff(
        &mut self,
        league: &LeagueContext,
        week: u32,
        cutoff: Option<DateTime<Utc>>,
    ) -> Arc<WeekPayload> {
        let key = (league.league_id, league.year, week, cutoff);
        let ttl = self.runtime.cache_ttl_seconds;
        if let Some(cached) = &self.cache
            && cached.key == key
            && cached.built_at.elapsed().as_secs() <= ttl
        {
            return Arc::clone(&cached.payload);
        }

        let payload = Arc::new(self.build_week_payload(league, week, cutoff));
        self.cache = Some(CachedPayload {
            key,
            built_at: Instant::now(),
            payload: Arc::clone(&payload),
        });
        payload
    }

    /// Diagnostics from the most recent computation; no recompute.
    pub fn last_diagnostics(&self) -> Option<Arc<WeekPayload>> {
        self.cache.as_ref().map(|c| Arc::clone(&c.payload))
    }

    pub fn last_warnings(&self) -> Vec<String> {
        self.cache
            .as_ref()
            .map(|c| c.payload.warnings.clone())
            .unwrap_or_default()
    }

    fn resolve_feed(
        &self,
        feed_name: &str,
        league: &LeagueContext,
        week: u32,
        cutoff: Option<DateTime<Utc>>,
    ) -> FeedEnvelope {
        // Replay path: leakage-guarded lookup through the snapshot store.
        if let (Some(store), Some(cutoff)) = (self.snapshots.as_ref(), cutoff) {
            let lag = self.runtime.publication_lag_seconds(feed_name);
            let effective = cutoff - ChronoDuration::seconds(lag.max(0));
            let resolved = store.resolve(
                league.league_id,
                league.year,
                week,
                feed_name,
                Some(effective),
                self.runtime.max_staleness_seconds(feed_name),
            );
            return sanitize_or_pass(feed_name, resolved.envelope);
        }

        // Live path: adapter fetch, journaled when a store is attached.
        let Some(adapter) = self.adapters.get(feed_name) else {
            return FeedEnvelope::neutral(Utc::now())
                .with_flag(FLAG_FEED_UNAVAILABLE)
                .with_warning(format!("{feed_name}: no adapter configured"));
        };

        match adapter.fetch(league.league_id, league.year, week) {
            Ok(envelope) => {
                let envelope = sanitize_envelope(feed_name, envelope);
                if let Some(store) = self.snapshots.as_ref()
                    && let Err(err) =
                        store.record(league.league_id, league.year, week, feed_name, &envelope)
                {
                    warn!(feed = feed_name, %err, "snapshot journal write failed");
                }
                envelope
            }
            Err(err) => {
                warn!(feed = feed_name, %err, "feed fetch failed");
                FeedEnvelope::neutral(Utc::now())
                    .with_flag(FLAG_FEED_UNAVAILABLE)
                    .with_warning(format!("{feed_name}: {err}"))
            }
        }
    }

    fn build_week_payload(
        &self,
        league: &LeagueContext,
        week: u32,
        cutoff: Option<DateTime<Utc>>,
    ) -> WeekPayload {
        let mut feeds: HashMap<&str, FeedEnvelope> = HashMap::new();
        let mut warnings: Vec<String> = Vec::new();
        for feed_name in FEED_NAMES {
            let envelope = self.resolve_feed(feed_name, league, week, cutoff);
            warnings.extend(envelope.warnings.iter().cloned());
            feeds.insert(feed_name, envelope);
        }

        let mut quality_flags = BTreeSet::new();
        for (feed_name, envelope) in &feeds {
            for flag in &envelope.quality_flags {
                quality_flags.insert(format!("{feed_name}:{flag}"));
            }
        }
        if FEED_NAMES
            .iter()
            .all(|name| !feeds[name].is_usable())
        {
            warnings.push(
                "External feeds unavailable; provider degraded to league-only signals".to_string(),
            );
        }

        let mut active_signals: Vec<String> =
            BASE_SIGNALS.iter().map(|s| s.to_string()).collect();
        if self.alpha.enable_extended_signals {
            active_signals.extend(EXTENDED_SIGNALS.iter().map(|s| s.to_string()));
        }
        let weights = normalized_weights(&self.alpha, &active_signals);

        let view = LeagueView::build(league, week, &feeds);

        let mut adjustments = HashMap::new();
        let mut injury_overrides = HashMap::new();
        let mut non_zero = 0usize;
        let mut cap_hits = 0usize;

        for team in &league.teams {
            for player in &team.roster {
                let adjustment = self.score_player(player, team, week, &view, &feeds, &weights);
                if adjustment.delta_mean_points.abs() > 1e-9 {
                    non_zero += 1;
                }
                if adjustment.delta_mean_points.abs() >= self.alpha.total_cap - 1e-9 {
                    cap_hits += 1;
                }
                let status = adjustment.injury_status.clone();
                if !status.is_empty() && status != "ACTIVE" && status != "NORMAL" {
                    injury_overrides.insert(player.player_id, status);
                }
                adjustments.insert(player.player_id, adjustment);
            }
        }
        for player in &league.free_agents {
            let adjustment = self.score_free_agent(player, week, &view, &feeds, &weights);
            adjustments.insert(player.player_id, adjustment);
        }

        let players_evaluated = adjustments.len();
        WeekPayload {
            adjustments,
            injury_overrides,
            warnings,
            summary: ProviderSummary {
                players_evaluated,
                players_with_non_zero_alpha: non_zero,
                cap_hits_total_adjustment: cap_hits,
                quality_flags,
                active_signals,
                extended_signals_enabled: self.alpha.enable_extended_signals,
            },
        }
    }

    fn cap_for(&self, signal: &str) -> (f64, f64) {
        self.alpha
            .signal_caps
            .get(signal)
            .copied()
            .unwrap_or_else(|| default_cap(signal))
    }

    fn score_free_agent(
        &self,
        player: &Player,
        week: u32,
        view: &LeagueView,
        feeds: &HashMap<&str, FeedEnvelope>,
        weights: &BTreeMap<String, f64>,
    ) -> AlphaAdjustment {
        // Free agents have no fantasy-team context; team-scoped signals sit
        // at neutral and the player-scoped ones still apply.
        self.score_inner(player, None, week, view, feeds, weights)
    }

    fn score_player(
        &self,
        player: &Player,
        team: &Team,
        week: u32,
        view: &LeagueView,
        feeds: &HashMap<&str, FeedEnvelope>,
        weights: &BTreeMap<String, f64>,
    ) -> AlphaAdjustment {
        self.score_inner(player, Some(team), week, view, feeds, weights)
    }

    fn score_inner(
        &self,
        player: &Player,
        team: Option<&Team>,
        week: u32,
        view: &LeagueView,
        feeds: &HashMap<&str, FeedEnvelope>,
        weights: &BTreeMap<String, f64>,
    ) -> AlphaAdjustment {
        let pos = player.position;
        let pid = player.player_id;
        let reg_games = view.reg_games;
        let baseline = player.weekly_baseline(reg_games);

        let recent_points = player.recent_points(week.saturating_sub(1));
        let observed_weeks = recent_points.len();
        let recent_avg = mean_of(&recent_points[..recent_points.len().min(3)], baseline);
        let older_avg = mean_of(
            &recent_points[recent_points.len().min(3)..recent_points.len().min(6)],
            baseline,
        );
        let volatility = if recent_points.len() >= 2 {
            sample_std(&recent_points[..recent_points.len().min(6)])
        } else {
            (baseline * 0.2).max(2.0)
        };

        let team_id = team.map(|t| t.team_id);
        let opponent_id = team.and_then(|t| {
            if week >= 1 {
                t.schedule.get(week as usize - 1).copied()
            } else {
                None
            }
        });

        let market = &feeds["market"];
        let odds = &feeds["odds"];
        let weather = &feeds["weather"];
        let injury = &feeds["injury_news"];
        let nextgen = &feeds["nextgenstats"];

        // Status resolution: explicit feed first, roster record second.
        let feed_status = lookup_str(&injury.data, "injury_status", &pid.to_string());
        let status_explicit = feed_status.is_some() && injury.is_usable();
        let status = feed_status
            .map(|s| s.trim().to_ascii_uppercase())
            .or_else(|| player.injury_status.map(|s| s.as_str().to_string()))
            .unwrap_or_default();

        let ng_metrics = lookup_object(&nextgen.data, "player_metrics", &pid.to_string());
        let ng = |key: &str| ng_metrics.as_ref().and_then(|m| value_f64(m.get(key)));

        // --- base signals, in priority order ---

        let market_projection = lookup_f64(&market.data, "projections", &pid.to_string());
        let residual = market_projection.map(|p| p - baseline).unwrap_or(0.0);
        let projection_residual = 0.5 * residual
            + 0.20 * ng("explosive_play_rate").unwrap_or(0.0)
            + 0.10 * ng("avg_separation").unwrap_or(0.0);

        let usage_value = lookup_f64(&market.data, "usage_trend", &pid.to_string())
            .unwrap_or(recent_avg - older_avg)
            + 0.30 * ng("usage_over_expected").unwrap_or(0.0)
            + if matches!(pos, Position::Wr | Position::Te) {
                0.12 * ng("route_participation").unwrap_or(0.0)
            } else {
                0.0
            };
        let usage_trend = 0.6 * usage_value * usage_position_scale(pos);

        let own_penalty = match status.as_str() {
            "OUT" | "INJURY_RESERVE" => -3.0,
            "DOUBTFUL" => -1.8,
            "QUESTIONABLE" => -0.8,
            "DAY_TO_DAY" => -0.4,
            "SUSPENSION" => -2.5,
            _ => 0.0,
        };
        let mut teammate_out = team_id
            .and_then(|id| view.injured_counts.get(&(id, pos)))
            .copied()
            .unwrap_or(0);
        if own_penalty < -1.0 {
            teammate_out = teammate_out.saturating_sub(1);
        }
        let injury_opportunity = own_penalty
            + if own_penalty == 0.0 {
                0.8 * teammate_out as f64
            } else {
                0.0
            };

        let dvp = opponent_id
            .and_then(|opp| lookup_nested_f64(&odds.data, "defense_vs_position", &opp.to_string(), pos.as_str()))
            .unwrap_or(0.0);
        let matchup_unit = 0.2 * dvp;
        let matchup_signal_multiplier = clamp_range(
            1.0 + 0.025 * dvp,
            MATCHUP_MULTIPLIER_RANGE,
        );

        let spread = team_id
            .and_then(|id| lookup_f64(&odds.data, "spread_by_team", &id.to_string()))
            .unwrap_or(0.0);
        let implied_total = team_id
            .and_then(|id| lookup_f64(&odds.data, "implied_total_by_team", &id.to_string()))
            .unwrap_or(22.0);
        let favorite = spread < 0.0;
        let script_base = match pos {
            Position::Qb | Position::Wr | Position::Te => {
                if favorite { -0.30 } else { 0.35 }
            }
            Position::Rb => {
                if favorite { 0.40 } else { -0.25 }
            }
            _ => 0.05,
        };
        let game_script = script_base + 0.08 * ((implied_total - 22.0) / 3.0);

        let volatility_proxy =
            (0.55 * volatility + 0.45 * ng("volatility_index").unwrap_or(volatility)).max(0.0);
        let volatility_aware =
            -0.08 * volatility_proxy + if volatility_proxy < 4.0 { 0.25 } else { 0.0 };

        let weather_info = team_id.and_then(|id| {
            lookup_object(&weather.data, "team_weather", &id.to_string())
        });
        let weather_venue = match weather_info.as_ref() {
            Some(info) => weather_signal(pos, info),
            None if weather.is_usable() => dome_fallback(&player.pro_team, pos),
            None => 0.0,
        };

        let sentiment = lookup_f64(&market.data, "sentiment", &pid.to_string()).unwrap_or(0.0);
        let started_pct = player.percent_started;
        let mut market_sentiment_contrarian = -0.5 * sentiment;
        if started_pct >= 75.0 && residual < 0.0 {
            market_sentiment_contrarian -= (residual.abs() * 0.12).min(1.0);
        }
        if started_pct <= 40.0 && residual > 0.0 {
            market_sentiment_contrarian += (residual * 0.12).min(1.0);
        }

        let replacement = view
            .replacement_by_position
            .get(&pos)
            .copied()
            .unwrap_or(baseline);
        let starter_value = team_id
            .and_then(|id| view.team_starters.get(&(id, pos)))
            .copied()
            .unwrap_or(replacement);
        let waiver_replacement_value =
            0.03 * (baseline - replacement) + 0.08 * (baseline - starter_value);

        let schedule_strength = team_id
            .and_then(|id| {
                schedule_strength_from(
                    &odds.data,
                    &market.data,
                    &id.to_string(),
                    self.alpha.schedule_horizon_weeks,
                )
            })
            .unwrap_or(0.0);
        let short_term_schedule_cluster = 0.25 * schedule_strength + 0.05 * dvp;

        let ownership = lookup_f64(&market.data, "ownership_by_player", &pid.to_string())
            .unwrap_or(started_pct / 100.0)
            .clamp(0.0, 1.0);

        let mut raw_signals: Vec<(&str, f64)> = vec![
            ("projection_residual", projection_residual),
            ("usage_trend", usage_trend),
            ("injury_opportunity", injury_opportunity),
            ("matchup_unit", matchup_unit),
            ("game_script", game_script),
            ("volatility_aware", volatility_aware),
            ("weather_venue", weather_venue),
            ("market_sentiment_contrarian", market_sentiment_contrarian),
            ("waiver_replacement_value", waiver_replacement_value),
            ("short_term_schedule_cluster", short_term_schedule_cluster),
        ];

        if self.alpha.enable_extended_signals {
            let position_ownership = view
                .mean_ownership_by_position
                .get(&pos)
                .copied()
                .unwrap_or(ownership);
            let residual_z =
                (residual / (baseline * 0.35).max(2.0)).clamp(-2.5, 2.5);
            let player_tilt_leverage = 2.0 * (position_ownership - ownership) * residual_z;

            let props = lookup_object(&odds.data, "player_props_by_player", &pid.to_string());
            let vegas_props = props
                .map(|p| {
                    let line_open = value_f64(p.get("line_open")).unwrap_or(baseline);
                    let line_current = value_f64(p.get("line_current")).unwrap_or(line_open);
                    let sharp = value_f64(p.get("sharp_over_pct"))
                        .unwrap_or(0.5)
                        .clamp(0.0, 1.0);
                    let line_edge = (line_current - baseline) / baseline.abs().max(5.0);
                    let line_move = (line_current - line_open) / line_open.abs().max(3.0);
                    3.0 * line_edge + 1.8 * line_move + 1.5 * (sharp - 0.5)
                })
                .unwrap_or(0.0);

            let win_probability_script = team_id
                .and_then(|id| {
                    win_probability_signal(&odds.data, &id.to_string(), pos)
                })
                .unwrap_or(0.0);

            let backup_ratio =
                lookup_f64(&injury.data, "backup_projection_ratio_by_player", &pid.to_string());
            let backup_quality_adjustment = backup_ratio
                .map(|ratio| {
                    let weight = backup_position_weight(pos);
                    if ratio < 0.40 {
                        0.15 * weight
                    } else if ratio > 0.80 {
                        -0.10 * weight
                    } else {
                        0.0
                    }
                })
                .unwrap_or(0.0);

            let red_zone_opportunity = 0.20
                * ng("red_zone_touch_share").unwrap_or(0.0).clamp(0.0, 1.0)
                + 0.30 * ng("red_zone_touch_trend").unwrap_or(0.0).clamp(-1.0, 1.0);

            let snap_count_percentage = if ng("snap_share").is_some()
                || ng("snap_share_trend").is_some()
            {
                let level = ((ng("snap_share").unwrap_or(0.0).clamp(0.0, 1.0) - 0.50) / 0.30)
                    .clamp(-1.0, 1.0);
                let trend = (ng("snap_share_trend").unwrap_or(0.0) / 0.10).clamp(-1.0, 1.0);
                0.20 * level + 0.30 * trend
            } else {
                0.0
            };

            let line_movement = team_id
                .map(|id| {
                    let key = id.to_string();
                    let opening =
                        lookup_f64(&odds.data, "opening_spread_by_team", &key).unwrap_or(spread);
                    let closing =
                        lookup_f64(&odds.data, "closing_spread_by_team", &key).unwrap_or(spread);
                    let movement = closing - opening;
                    let direction = if movement < 0.0 { 1.0 } else { -1.0 };
                    line_move_weight(pos) * direction * movement.abs().clamp(0.0, 4.0)
                })
                .unwrap_or(0.0);

            raw_signals.extend_from_slice(&[
                ("player_tilt_leverage", player_tilt_leverage),
                ("vegas_props", vegas_props),
                ("win_probability_script", win_probability_script),
                ("backup_quality_adjustment", backup_quality_adjustment),
                ("red_zone_opportunity", red_zone_opportunity),
                ("snap_count_percentage", snap_count_percentage),
                ("line_movement", line_movement),
            ]);
        }

        // Clip, weight, aggregate.
        let mut contributions = Vec::with_capacity(raw_signals.len());
        let mut weighted_sum = 0.0;
        let mut variance_sum = 0.0;
        let mut player_warnings = Vec::new();

        for &(signal, raw) in &raw_signals {
            let mut raw = raw;
            let mut quality = Vec::new();
            let source_feed = feed_for_signal(signal);
            let feed_usable = source_feed
                .map(|name| feeds[name].is_usable())
                .unwrap_or(true);

            if !raw.is_finite() {
                quality.push("non_finite_defaulted".to_string());
                player_warnings.push(format!("{signal}: non-finite value reset to neutral"));
                raw = 0.0;
            }
            if let Some(name) = source_feed
                && !feed_usable
                && signal_requires_feed(signal)
            {
                // Domain is down; only league-derived fallbacks survive.
                quality.push(FLAG_FEED_UNAVAILABLE.to_string());
                quality.push(format!("feed:{name}"));
                raw = 0.0;
            }

            let mut confidence = confidence_for(
                signal,
                observed_weeks,
                status_explicit,
                feed_usable,
            );
            let mut weight = weights.get(signal).copied().unwrap_or(0.0);
            if confidence == 0.0 {
                weight = 0.0;
            }

            let clipped = clamp_range(raw, self.cap_for(signal));
            let weighted = clipped * weight;
            weighted_sum += weighted;
            variance_sum += weight * signal_variance(signal);
            if weight == 0.0 {
                confidence = confidence.min(0.05);
            }

            contributions.push(SignalContribution {
                signal: signal.to_string(),
                raw,
                clipped,
                weight,
                weighted,
                confidence,
                source: source_feed.unwrap_or("league").to_string(),
                quality_flags: quality,
            });
        }

        let delta_mean_points = weighted_sum.clamp(-self.alpha.total_cap, self.alpha.total_cap);

        // Multiplier composition: matchup rank, then small schedule and
        // weather modulation, then the hard cap.
        let cluster_clipped = contributions
            .iter()
            .find(|c| c.signal == "short_term_schedule_cluster")
            .map(|c| c.clipped)
            .unwrap_or(0.0);
        let weather_clipped = contributions
            .iter()
            .find(|c| c.signal == "weather_venue")
            .map(|c| c.clipped)
            .unwrap_or(0.0);
        let mut matchup_multiplier = matchup_signal_multiplier * (1.0 + 0.01 * cluster_clipped);
        matchup_multiplier *= 1.0 + (weather_clipped * 0.02).clamp(-0.03, 0.03);
        let matchup_multiplier = clamp_range(matchup_multiplier, MATCHUP_MULTIPLIER_RANGE);

        AlphaAdjustment {
            player_id: pid,
            position: pos,
            delta_mean_points,
            delta_stdev_points: variance_sum.sqrt(),
            matchup_multiplier,
            injury_status: status,
            contributions,
            warnings: player_warnings,
        }
    }
}

/// League-wide precomputation shared by every per-player scoring pass.
struct LeagueView {
    reg_games: u32,
    replacement_by_position: HashMap<Position, f64>,
    team_starters: HashMap<(u32, Position), f64>,
    mean_ownership_by_position: HashMap<Position, f64>,
    injured_counts: HashMap<(u32, Position), u32>,
}

impl LeagueView {
    fn build(
        league: &LeagueContext,
        _week: u32,
        feeds: &HashMap<&str, FeedEnvelope>,
    ) -> LeagueView {
        let reg_games = league.settings.reg_season_count.max(1);
        let market = &feeds["market"];
        let injury = &feeds["injury_news"];

        let mut position_values: HashMap<Position, Vec<f64>> = HashMap::new();
        let mut team_starters: HashMap<(u32, Position), f64> = HashMap::new();
        let mut ownership_by_position: HashMap<Position, Vec<f64>> = HashMap::new();
        let mut injured_counts: HashMap<(u32, Position), u32> = HashMap::new();

        for team in &league.teams {
            for player in &team.roster {
                let baseline = player.weekly_baseline(reg_games);
                position_values
                    .entry(player.position)
                    .or_default()
                    .push(baseline);
                let starter = team_starters
                    .entry((team.team_id, player.position))
                    .or_insert(0.0);
                if baseline > *starter {
                    *starter = baseline;
                }

                let ownership = lookup_f64(
                    &market.data,
                    "ownership_by_player",
                    &player.player_id.to_string(),
                )
                .unwrap_or(player.percent_started / 100.0)
                .clamp(0.0, 1.0);
                ownership_by_position
                    .entry(player.position)
                    .or_default()
                    .push(ownership);

                let status = lookup_str(&injury.data, "injury_status", &player.player_id.to_string())
                    .map(|s| s.trim().to_ascii_uppercase())
                    .or_else(|| player.injury_status.map(|s| s.as_str().to_string()));
                if let Some(status) = status
                    && matches!(
                        status.as_str(),
                        "OUT" | "DOUBTFUL" | "INJURY_RESERVE" | "SUSPENSION"
                    )
                {
                    *injured_counts
                        .entry((team.team_id, player.position))
                        .or_insert(0) += 1;
                }
            }

            // External per-team injury counts add on top of roster-derived ones.
            if let Some(counts) = lookup_object(
                &injury.data,
                "team_injuries_by_position",
                &team.team_id.to_string(),
            ) {
                for (pos_key, value) in counts {
                    if let (Some(pos), Some(count)) =
                        (Position::parse(&pos_key), value_f64(Some(&value)))
                    {
                        *injured_counts.entry((team.team_id, pos)).or_insert(0) +=
                            count.max(0.0) as u32;
                    }
                }
            }
        }

        let replacement_by_position = position_values
            .into_iter()
            .map(|(pos, mut values)| {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                (pos, percentile(&values, 35.0))
            })
            .collect();

        let mean_ownership_by_position = ownership_by_position
            .into_iter()
            .map(|(pos, values)| {
                let mean = if values.is_empty() {
                    0.5
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                (pos, mean)
            })
            .collect();

        LeagueView {
            reg_games,
            replacement_by_position,
            team_starters,
            mean_ownership_by_position,
            injured_counts,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal helpers
// ---------------------------------------------------------------------------

fn usage_position_scale(pos: Position) -> f64 {
    match pos {
        Position::Rb => 1.15,
        Position::Wr => 1.10,
        Position::Te => 0.90,
        Position::Qb => 0.85,
        Position::K | Position::Def => 0.40,
    }
}

fn backup_position_weight(pos: Position) -> f64 {
    match pos {
        Position::Qb => 1.0,
        Position::Rb => 0.4,
        Position::Te => 0.3,
        Position::Wr => 0.2,
        Position::Def => 0.15,
        Position::K => 0.1,
    }
}

fn line_move_weight(pos: Position) -> f64 {
    match pos {
        Position::Rb => 0.20,
        Position::Qb | Position::Wr => 0.15,
        Position::Def => 0.12,
        Position::Te => 0.10,
        Position::K => 0.05,
    }
}

fn dome_fallback(pro_team: &str, pos: Position) -> f64 {
    let key = pro_team.trim().to_ascii_uppercase();
    if !DOME_TEAMS.contains(key.as_str()) {
        return 0.0;
    }
    if matches!(pos, Position::Qb | Position::Wr | Position::Te) {
        0.15
    } else {
        0.05
    }
}

fn weather_signal(pos: Position, info: &serde_json::Map<String, Value>) -> f64 {
    let passing = matches!(pos, Position::Qb | Position::Wr | Position::Te);
    let kicking_exposed = passing || pos == Position::K;
    if info.get("is_dome").and_then(Value::as_bool).unwrap_or(false) {
        return if passing { 0.15 } else { 0.05 };
    }
    let wind = value_f64(info.get("wind_mph")).unwrap_or(0.0);
    let precip = value_f64(info.get("precip_prob")).unwrap_or(0.0);
    let mut signal = 0.0;
    if wind >= 15.0 {
        signal -= if kicking_exposed { 0.5 } else { 0.1 };
    }
    if wind >= 22.0 {
        signal -= if kicking_exposed { 0.4 } else { 0.1 };
    }
    if precip >= 0.4 {
        signal -= if kicking_exposed { 0.4 } else { 0.05 };
    }
    signal
}

fn win_probability_signal(odds_data: &Value, team_key: &str, pos: Position) -> Option<f64> {
    let win_prob = lookup_f64(odds_data, "win_probability_by_team", team_key);
    let state = lookup_object(odds_data, "live_game_state_by_team", team_key);
    if win_prob.is_none() && state.is_none() {
        return None;
    }

    let team_win_prob = win_prob.unwrap_or(0.5).clamp(0.0, 1.0);
    let quarter = state
        .as_ref()
        .and_then(|s| value_f64(s.get("quarter")))
        .unwrap_or(0.0);
    let time_remaining = state
        .as_ref()
        .and_then(|s| value_f64(s.get("time_remaining_sec")))
        .unwrap_or(900.0);
    let score_differential = state
        .as_ref()
        .and_then(|s| value_f64(s.get("score_differential")))
        .unwrap_or(0.0);

    let mut live_weight = ((quarter - 1.0) / 3.0).clamp(0.0, 1.0);
    if quarter >= 4.0 {
        let late = 1.0 - time_remaining.clamp(0.0, 900.0) / 900.0;
        live_weight = (live_weight + 0.5 * late).clamp(0.0, 1.0);
    }
    let score_pressure = (score_differential / 14.0).clamp(-1.5, 1.5);
    let position_weight = match pos {
        Position::Qb => -1.0,
        Position::Wr => -0.85,
        Position::Te => -0.60,
        Position::Rb => 0.95,
        Position::K => 0.20,
        Position::Def => 0.25,
    };

    Some(
        1.8 * (team_win_prob - 0.5) * position_weight
            + 0.7 * live_weight * score_pressure * position_weight,
    )
}

fn schedule_strength_from(
    odds_data: &Value,
    market_data: &Value,
    team_key: &str,
    horizon_weeks: u32,
) -> Option<f64> {
    let entry = odds_data
        .get("schedule_strength_by_team")
        .and_then(|m| m.get(team_key))
        .or_else(|| {
            market_data
                .get("future_schedule_strength")
                .and_then(|m| m.get(team_key))
        })?;
    match entry {
        Value::Array(items) => {
            let horizon = horizon_weeks.max(1) as usize;
            let selected: Vec<f64> = items
                .iter()
                .take(horizon)
                .filter_map(|v| v.as_f64())
                .collect();
            if selected.is_empty() {
                Some(0.0)
            } else {
                Some(selected.iter().sum::<f64>() / selected.len() as f64)
            }
        }
        other => other.as_f64(),
    }
}

/// Signals that are pure feed reads go neutral when the feed is down; the
/// rest blend feed data with league-derived fallbacks and stay live.
fn signal_requires_feed(signal: &str) -> bool {
    !matches!(
        signal,
        "usage_trend" | "injury_opportunity" | "volatility_aware" | "waiver_replacement_value"
    )
}

fn confidence_for(
    signal: &str,
    observed_weeks: usize,
    status_explicit: bool,
    feed_usable: bool,
) -> f64 {
    match signal {
        "usage_trend" | "volatility_aware" => match observed_weeks {
            0 => 0.0,
            1 => 0.40,
            2 | 3 => 0.75,
            _ => 0.95,
        },
        "injury_opportunity" | "backup_quality_adjustment" => {
            if status_explicit { 0.95 } else { 0.70 }
        }
        _ => {
            if feed_usable {
                0.85
            } else {
                0.0
            }
        }
    }
}

fn normalized_weights(alpha: &AlphaConfig, active: &[String]) -> BTreeMap<String, f64> {
    let mut weights: BTreeMap<String, f64> = active
        .iter()
        .map(|name| {
            let configured = alpha.signal_weights.get(name).copied().unwrap_or(1.0);
            (name.clone(), configured.max(0.0))
        })
        .collect();
    let total: f64 = weights.values().sum();
    if total <= 0.0 {
        let equal = 1.0 / active.len().max(1) as f64;
        for value in weights.values_mut() {
            *value = equal;
        }
    } else {
        for value in weights.values_mut() {
            *value /= total;
        }
    }
    weights
}

// ---------------------------------------------------------------------------
// JSON map access
// ---------------------------------------------------------------------------

fn value_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

fn lookup_f64(data: &Value, map_key: &str, id: &str) -> Option<f64> {
    data.get(map_key).and_then(|m| m.get(id)).and_then(Value::as_f64)
}

fn lookup_nested_f64(data: &Value, map_key: &str, id: &str, inner: &str) -> Option<f64> {
    data.get(map_key)
        .and_then(|m| m.get(id))
        .and_then(|m| m.get(inner))
        .and_then(Value::as_f64)
}

fn lookup_str(data: &Value, map_key: &str, id: &str) -> Option<String> {
    data.get(map_key)
        .and_then(|m| m.get(id))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

fn lookup_object(
    data: &Value,
    map_key: &str,
    id: &str,
) -> Option<serde_json::Map<String, Value>> {
    data.get(map_key)
        .and_then(|m| m.get(id))
        .and_then(Value::as_object)
        .cloned()
}

fn clamp_range(value: f64, (low, high): (f64, f64)) -> f64 {
    value.clamp(low, high)
}

fn mean_of(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        default
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    let frac = rank - low as f64;
    sorted[low] + (sorted[high.min(sorted.len() - 1)] - sorted[low]) * frac
}

fn sanitize_or_pass(feed_name: &str, envelope: FeedEnvelope) -> FeedEnvelope {
    if envelope.is_usable() {
        sanitize_envelope(feed_name, envelope)
    } else {
        envelope
    }
}
