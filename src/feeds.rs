// Feed adapters and the canonical envelope contract.
//
// Every external domain (weather, market, odds, injury news, NextGen stats)
// hands the core a normalized envelope. Adapters are the only code allowed to
// touch the network; everything downstream consumes envelopes and degrades to
// neutral when a domain is missing or malformed.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const FEED_NAMES: [&str; 5] = ["weather", "market", "odds", "injury_news", "nextgenstats"];

pub const FLAG_FEED_UNAVAILABLE: &str = "feed_unavailable";
pub const FLAG_SCHEMA_INVALID: &str = "schema_invalid";
pub const FLAG_AS_OF_MISS: &str = "as_of_miss";
pub const FLAG_STALE: &str = "stale";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEnvelope {
    /// Domain-specific normalized payload. Always a JSON object.
    pub data: Value,
    pub source_timestamp: DateTime<Utc>,
    /// When the record became publicly available; drives as-of resolution.
    pub publish_time: DateTime<Utc>,
    pub quality_flags: BTreeSet<String>,
    pub warnings: Vec<String>,
}

impl FeedEnvelope {
    pub fn neutral(now: DateTime<Utc>) -> Self {
        Self {
            data: Value::Object(Default::default()),
            source_timestamp: now,
            publish_time: now,
            quality_flags: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.quality_flags.insert(flag.to_string());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.quality_flags.contains(flag)
    }

    /// True when the envelope carries usable domain data.
    pub fn is_usable(&self) -> bool {
        !self.has_flag(FLAG_FEED_UNAVAILABLE)
            && !self.has_flag(FLAG_SCHEMA_INVALID)
            && !self.has_flag(FLAG_AS_OF_MISS)
    }

    pub fn data_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.data.as_object()
    }
}

pub trait FeedAdapter: Send + Sync {
    fn feed_name(&self) -> &str;
    fn fetch(&self, league_id: u64, year: i32, week: u32) -> Result<FeedEnvelope>;
}

// ---------------------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------------------

fn is_object(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Object(_)))
}

fn is_number(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if v.as_f64().is_some())
}

fn in_unit_range(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_f64)
        .map(|v| (0.0..=1.0).contains(&v))
        .unwrap_or(false)
}

fn require_objects(data: &Value, domain: &str, keys: &[&str], errors: &mut Vec<String>) {
    for key in keys {
        if !is_object(data.get(*key)) {
            errors.push(format!("{domain}.{key}_missing_or_invalid"));
        }
    }
}

/// Domain-level schema checks. The envelope-level contract (object data,
/// UTC timestamps, string flags) is enforced by the types.
pub fn validate_feed_data(feed_name: &str, data: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if !data.is_object() {
        return vec![format!("{feed_name}.data_not_object")];
    }

    match feed_name {
        "weather" => {
            let Some(team_weather) = data.get("team_weather").and_then(Value::as_object) else {
                return vec!["weather.team_weather_missing_or_invalid".to_string()];
            };
            for (team_id, item) in team_weather {
                let Some(item) = item.as_object() else {
                    errors.push(format!("weather.team_weather.{team_id}_not_object"));
                    continue;
                };
                if !matches!(item.get("is_dome"), Some(Value::Bool(_))) {
                    errors.push(format!("weather.team_weather.{team_id}.is_dome_invalid"));
                }
                if !is_number(item.get("wind_mph")) {
                    errors.push(format!("weather.team_weather.{team_id}.wind_mph_invalid"));
                }
                if !in_unit_range(item.get("precip_prob")) {
                    errors.push(format!("weather.team_weather.{team_id}.precip_prob_invalid"));
                }
            }
        }
        "market" => {
            require_objects(
                data,
                "market",
                &[
                    "projections",
                    "usage_trend",
                    "sentiment",
                    "future_schedule_strength",
                ],
                &mut errors,
            );
            if let Some(ownership) = data.get("ownership_by_player") {
                match ownership.as_object() {
                    Some(map) => {
                        for (player_id, value) in map {
                            if !in_unit_range(Some(value)) {
                                errors.push(format!(
                                    "market.ownership_by_player.{player_id}_invalid"
                                ));
                            }
                        }
                    }
                    None => errors.push("market.ownership_by_player_missing_or_invalid".into()),
                }
            }
        }
        "odds" => {
            require_objects(
                data,
                "odds",
                &[
                    "defense_vs_position",
                    "spread_by_team",
                    "implied_total_by_team",
                    "schedule_strength_by_team",
                ],
                &mut errors,
            );
            if let Some(win_prob) = data.get("win_probability_by_team") {
                match win_prob.as_object() {
                    Some(map) => {
                        for (team_id, value) in map {
                            if !in_unit_range(Some(value)) {
                                errors.push(format!(
                                    "odds.win_probability_by_team.{team_id}_invalid"
                                ));
                            }
                        }
                    }
                    None => errors.push("odds.win_probability_by_team_missing_or_invalid".into()),
                }
            }
            if let Some(props) = data.get("player_props_by_player") {
                match props.as_object() {
                    Some(map) => {
                        for (player_id, entry) in map {
                            let Some(entry) = entry.as_object() else {
                                errors.push(format!(
                                    "odds.player_props_by_player.{player_id}_not_object"
                                ));
                                continue;
                            };
                            if !is_number(entry.get("line_open"))
                                || !is_number(entry.get("line_current"))
                            {
                                errors.push(format!(
                                    "odds.player_props_by_player.{player_id}.lines_invalid"
                                ));
                            }
                        }
                    }
                    None => errors.push("odds.player_props_by_player_missing_or_invalid".into()),
                }
            }
        }
        "injury_news" => {
            require_objects(
                data,
                "injury_news",
                &["injury_status", "team_injuries_by_position"],
                &mut errors,
            );
            if let Some(ratios) = data.get("backup_projection_ratio_by_player") {
                match ratios.as_object() {
                    Some(map) => {
                        for (player_id, value) in map {
                            if !in_unit_range(Some(value)) {
                                errors.push(format!(
                                    "injury_news.backup_projection_ratio_by_player.{player_id}_invalid"
                                ));
                            }
                        }
                    }
                    None => errors.push(
                        "injury_news.backup_projection_ratio_by_player_missing_or_invalid".into(),
                    ),
                }
            }
        }
        "nextgenstats" => {
            let Some(metrics) = data.get("player_metrics").and_then(Value::as_object) else {
                return vec!["nextgenstats.player_metrics_missing_or_invalid".to_string()];
            };
            for (player_id, entry) in metrics {
                let Some(entry) = entry.as_object() else {
                    errors.push(format!("nextgenstats.player_metrics.{player_id}_not_object"));
                    continue;
                };
                for field in [
                    "usage_over_expected",
                    "route_participation",
                    "avg_separation",
                    "explosive_play_rate",
                    "volatility_index",
                    "red_zone_touch_trend",
                    "snap_share_trend",
                ] {
                    if entry.contains_key(field) && !is_number(entry.get(field)) {
                        errors.push(format!(
                            "nextgenstats.player_metrics.{player_id}.{field}_invalid"
                        ));
                    }
                }
                for field in ["red_zone_touch_share", "snap_share"] {
                    if entry.contains_key(field) && !in_unit_range(entry.get(field)) {
                        errors.push(format!(
                            "nextgenstats.player_metrics.{player_id}.{field}_invalid"
                        ));
                    }
                }
            }
        }
        other => errors.push(format!("unsupported_domain:{other}")),
    }

    errors
}

/// Enforce the schema: invalid payloads degrade to a neutral envelope that
/// keeps the timestamps but drops the data.
pub fn sanitize_envelope(feed_name: &str, envelope: FeedEnvelope) -> FeedEnvelope {
    let errors = validate_feed_data(feed_name, &envelope.data);
    if errors.is_empty() {
        return envelope;
    }
    warn!(feed = feed_name, errors = errors.len(), "feed failed schema validation");
    let mut degraded = envelope;
    degraded.data = Value::Object(Default::default());
    degraded.quality_flags.insert(FLAG_SCHEMA_INVALID.to_string());
    for error in errors.into_iter().take(8) {
        degraded.warnings.push(format!("{feed_name}_schema:{error}"));
    }
    degraded
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Fixed-payload adapter for offline runs and tests.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    pub name: String,
    pub envelope: FeedEnvelope,
}

impl StaticFeed {
    pub fn new(name: &str, data: Value, publish_time: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            envelope: FeedEnvelope {
                data,
                source_timestamp: publish_time,
                publish_time,
                quality_flags: BTreeSet::new(),
                warnings: Vec::new(),
            },
        }
    }
}

impl FeedAdapter for StaticFeed {
    fn feed_name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _league_id: u64, _year: i32, _week: u32) -> Result<FeedEnvelope> {
        Ok(self.envelope.clone())
    }
}

/// Blocking HTTP adapter. One GET per fetch with bounded retries; any JSON
/// object comes back coerced into the envelope contract.
pub struct HttpFeed {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    retries: u32,
    backoff: Duration,
}

impl HttpFeed {
    pub fn new(
        name: &str,
        endpoint: &str,
        api_key: Option<String>,
        timeout_seconds: f64,
        retries: u32,
        backoff_seconds: f64,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_seconds.max(0.1)))
            .build()
            .context("build feed http client")?;
        Ok(Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            api_key,
            client,
            retries,
            backoff: Duration::from_secs_f64(backoff_seconds.max(0.0)),
        })
    }

    fn get_once(&self, league_id: u64, year: i32, week: u32) -> Result<Value> {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}league_id={}&year={}&week={}",
            self.endpoint, sep, league_id, year, week
        );
        let mut request = self.client.get(&url);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = request.send().context("feed request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("feed http {status}"));
        }
        response.json::<Value>().context("feed body not json")
    }
}

impl FeedAdapter for HttpFeed {
    fn feed_name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, league_id: u64, year: i32, week: u32) -> Result<FeedEnvelope> {
        let mut last_error = None;
        for attempt in 0..=self.retries {
            match self.get_once(league_id, year, week) {
                Ok(value) => return Ok(coerce_envelope(value)),
                Err(err) => {
                    last_error = Some(err);
                    if attempt < self.retries && !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("feed fetch failed")))
    }
}

/// Accept either a full envelope-shaped object or a bare payload.
fn coerce_envelope(value: Value) -> FeedEnvelope {
    let now = Utc::now();
    let Some(object) = value.as_object() else {
        return FeedEnvelope::neutral(now).with_flag("non_object_payload_wrapped");
    };

    let looks_like_envelope =
        object.contains_key("data") && object.contains_key("source_timestamp");
    if !looks_like_envelope {
        let mut envelope = FeedEnvelope::neutral(now);
        envelope.data = Value::Object(object.clone());
        return envelope.with_flag("raw_payload_wrapped");
    }

    let source_timestamp = object
        .get("source_timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);
    let publish_time = object
        .get("publish_time")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(source_timestamp);

    let mut envelope = FeedEnvelope {
        data: object
            .get("data")
            .cloned()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Default::default())),
        source_timestamp,
        publish_time,
        quality_flags: BTreeSet::new(),
        warnings: Vec::new(),
    };
    if let Some(flags) = object.get("quality_flags").and_then(Value::as_array) {
        for flag in flags.iter().filter_map(Value::as_str) {
            envelope.quality_flags.insert(flag.to_string());
        }
    }
    if let Some(warnings) = object.get("warnings").and_then(Value::as_array) {
        for warning in warnings.iter().filter_map(Value::as_str) {
            envelope.warnings.push(warning.to_string());
        }
    }
    envelope
}
