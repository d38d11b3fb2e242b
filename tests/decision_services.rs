use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use gridiron_alpha::config::AnalysisConfig;
use gridiron_alpha::league::{
    InjuryStatus, LeagueContext, LeagueSettings, Outcome, Player, Position, ScheduledGame, Team,
    WeeklyStat,
};
use gridiron_alpha::opponent_strength::OpponentStrength;
use gridiron_alpha::player_model::PlayerModelStore;
use gridiron_alpha::ros_value::RosValuator;
use gridiron_alpha::decision::{DecisionEngine, TradeRecommendation};

fn projected(id: u64, position: Position, avg: f64) -> Player {
    Player {
        player_id: id,
        name: format!("Player {id}"),
        position,
        pro_team: String::new(),
        stats: BTreeMap::new(),
        schedule: BTreeMap::new(),
        injury_status: None,
        active: true,
        percent_started: 50.0,
        percent_owned: 40.0,
        projected_avg_points: avg,
        projected_total_points: 0.0,
        avg_points: avg,
        lineup_slot: None,
    }
}

fn bare_team(team_id: u32, name: &str, roster: Vec<Player>, weeks: usize) -> Team {
    Team {
        team_id,
        team_name: name.to_string(),
        division: String::new(),
        roster,
        schedule: vec![if team_id == 1 { 2 } else { 1 }; weeks],
        scores: vec![None; weeks],
        outcomes: vec![Outcome::U; weeks],
        acquisitions: 0,
        drops: 0,
        trades: 0,
    }
}

fn league_with(teams: Vec<Team>, free_agents: Vec<Player>, slots: Vec<&str>) -> LeagueContext {
    LeagueContext {
        league_id: 9,
        year: 2025,
        current_week: 12,
        settings: LeagueSettings {
            reg_season_count: 14,
            playoff_team_count: 2,
            lineup_slots: slots.into_iter().map(|s| s.to_string()).collect(),
            scoring_format_id: String::new(),
        },
        teams,
        free_agents,
        box_scores: BTreeMap::new(),
    }
}

fn model(tag: &str) -> PlayerModelStore {
    let dir = std::env::temp_dir().join(format!("gridiron_it_dec_{tag}"));
    let _ = std::fs::remove_dir_all(&dir);
    PlayerModelStore::open(dir, 24).unwrap()
}

#[test]
fn injury_whitelist_admits_exactly_healthy_and_unset() {
    // Six free agents at identical projections, one per status.
    let statuses: [Option<InjuryStatus>; 6] = [
        Some(InjuryStatus::Active),
        Some(InjuryStatus::Normal),
        Some(InjuryStatus::Out),
        Some(InjuryStatus::Questionable),
        Some(InjuryStatus::InjuryReserve),
        None,
    ];
    let free_agents: Vec<Player> = statuses
        .iter()
        .enumerate()
        .map(|(idx, status)| {
            let mut p = projected(50 + idx as u64, Position::Wr, 15.0);
            p.injury_status = *status;
            p
        })
        .collect();

    let my_team = bare_team(1, "Mine", vec![projected(1, Position::Qb, 18.0)], 14);
    let other = bare_team(2, "Other", vec![projected(2, Position::Qb, 17.0)], 14);
    let league = league_with(vec![my_team, other], free_agents, vec!["QB", "WR"]);

    let store = model("whitelist");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig::default();
    let mut engine = DecisionEngine::new(&league, &valuator, &config, 17);

    let recommendations = engine.recommend_free_agents(1);
    assert_eq!(recommendations.len(), 3, "whitelist should admit 3 of 6");
    let ids: Vec<u64> = recommendations.iter().map(|r| r.player_id).collect();
    assert!(ids.contains(&50)); // ACTIVE
    assert!(ids.contains(&51)); // NORMAL
    assert!(ids.contains(&55)); // unset
}

#[test]
fn free_agent_ranking_is_stable_across_reruns() {
    let free_agents: Vec<Player> = (0..8)
        .map(|idx| projected(60 + idx, Position::Rb, 9.0 + idx as f64))
        .collect();
    let my_roster = vec![
        projected(1, Position::Rb, 8.0),
        projected(2, Position::Rb, 12.0),
    ];
    let league = league_with(
        vec![
            bare_team(1, "Mine", my_roster, 14),
            bare_team(2, "Other", vec![projected(3, Position::Rb, 10.0)], 14),
        ],
        free_agents,
        vec!["RB", "RB"],
    );

    let store = model("stable");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig::default();

    let first: Vec<u64> = DecisionEngine::new(&league, &valuator, &config, 23)
        .recommend_free_agents(1)
        .iter()
        .map(|r| r.player_id)
        .collect();
    let second: Vec<u64> = DecisionEngine::new(&league, &valuator, &config, 23)
        .recommend_free_agents(1)
        .iter()
        .map(|r| r.player_id)
        .collect();
    assert_eq!(first, second);
    // Best projection first.
    assert_eq!(first.first(), Some(&67));
}

#[test]
fn lopsided_trade_is_unrealistic_and_rejected() {
    let my_roster = vec![
        projected(1, Position::Rb, 5.0),
        projected(2, Position::Qb, 16.0),
    ];
    let their_roster = vec![
        projected(3, Position::Rb, 17.0),
        projected(4, Position::Qb, 15.0),
    ];
    let league = league_with(
        vec![
            bare_team(1, "Mine", my_roster, 14),
            bare_team(2, "Theirs", their_roster, 14),
        ],
        Vec::new(),
        vec!["QB", "RB"],
    );

    let store = model("trade");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig::default();
    let mut engine = DecisionEngine::new(&league, &valuator, &config, 31);

    let analysis = engine
        .analyze_trade(1, 2, &[1], &[3], None)
        .expect("both teams exist");

    assert!(analysis.my_value_change > 0.0);
    assert!(analysis.their_value_change < 0.0);
    assert!(
        (analysis.advantage_margin
            - (analysis.my_value_change - analysis.their_value_change))
            .abs()
            < 1e-9
    );
    assert!(analysis.acceptance_probability <= 10.0);
    assert!(!analysis.is_realistic);
    assert_eq!(analysis.recommendation, TradeRecommendation::Reject);
}

#[test]
fn trade_search_respects_caps() {
    let my_roster: Vec<Player> = (0..5)
        .map(|i| projected(10 + i, Position::Rb, 8.0 + i as f64))
        .collect();
    let their_roster: Vec<Player> = (0..5)
        .map(|i| projected(20 + i, Position::Rb, 14.0 + i as f64))
        .collect();
    let league = league_with(
        vec![
            bare_team(1, "Mine", my_roster, 14),
            bare_team(2, "Theirs", their_roster, 14),
        ],
        Vec::new(),
        vec!["RB", "RB"],
    );

    let store = model("caps");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig {
        max_trades_per_team: 2,
        max_total_opportunities: 3,
        min_acceptance_probability: 0.0,
        min_advantage: 0.5,
        ..AnalysisConfig::default()
    };
    let mut engine = DecisionEngine::new(&league, &valuator, &config, 5);

    let opportunities = engine.find_trade_opportunities(1);
    assert!(opportunities.len() <= 2, "per-team cap applies before the global one");
    for window in opportunities.windows(2) {
        assert!(
            window[0].analysis.advantage_margin >= window[1].analysis.advantage_margin,
            "opportunities must be sorted by advantage"
        );
    }
}

#[test]
fn schedule_softness_separates_equal_season_averages() {
    // Seven defenses whose observed points pin the league mean at 10/week:
    // three soft, three tough, one balancing filler.
    let allowed: [(&str, f64); 7] = [
        ("T1", 7.5),
        ("T2", 7.8),
        ("T3", 8.0),
        ("S1", 11.8),
        ("S2", 12.0),
        ("S3", 12.0),
        ("FILL", 10.9),
    ];
    let kick = Utc.with_ymd_and_hms(2025, 11, 16, 18, 0, 0).unwrap();
    let mut roster = Vec::new();
    for (idx, (defense, points)) in allowed.iter().enumerate() {
        let mut player = projected(100 + idx as u64, Position::Rb, 10.0);
        for week in 1..=3u32 {
            player.stats.insert(
                week,
                WeeklyStat {
                    points: *points,
                    ..Default::default()
                },
            );
            player.schedule.insert(
                week,
                ScheduledGame {
                    opponent: defense.to_string(),
                    kickoff: kick,
                },
            );
        }
        roster.push(player);
    }

    let mut tough_road = projected(1, Position::Rb, 15.0);
    let mut soft_road = projected(2, Position::Rb, 15.0);
    for (week, (tough, soft)) in [(12u32, ("T1", "S1")), (13, ("T2", "S2")), (14, ("T3", "S3"))]
    {
        tough_road.schedule.insert(
            week,
            ScheduledGame {
                opponent: tough.to_string(),
                kickoff: kick,
            },
        );
        soft_road.schedule.insert(
            week,
            ScheduledGame {
                opponent: soft.to_string(),
                kickoff: kick,
            },
        );
    }
    roster.push(tough_road.clone());
    roster.push(soft_road.clone());

    let league = league_with(
        vec![
            bare_team(1, "Mine", roster, 14),
            bare_team(2, "Other", vec![projected(3, Position::Rb, 10.0)], 14),
        ],
        Vec::new(),
        vec!["RB", "RB"],
    );

    let store = model("softness");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);

    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
    let tough_value = valuator.player_ros(&tough_road, &mut rng);
    let soft_value = valuator.player_ros(&soft_road, &mut rng);

    let gap = soft_value.pts_per_week - tough_value.pts_per_week;
    assert!(
        (gap - 6.3).abs() <= 0.3,
        "expected about +6.3 pts/week for the softer schedule, got {gap:+.2}"
    );
}

#[test]
fn injured_position_falls_back_to_least_penalized_player_and_flags_slot() {
    use gridiron_alpha::alpha_model::PlayerProjection;
    use std::collections::HashMap;

    let mut out_rb = projected(1, Position::Rb, 14.0);
    out_rb.injury_status = Some(InjuryStatus::Out);
    let mut questionable_rb = projected(2, Position::Rb, 12.0);
    questionable_rb.injury_status = Some(InjuryStatus::Questionable);

    let league = league_with(
        vec![
            bare_team(1, "Mine", vec![out_rb, questionable_rb], 14),
            bare_team(2, "Other", vec![projected(3, Position::Rb, 10.0)], 14),
        ],
        Vec::new(),
        vec!["RB"],
    );

    let store = model("injured_slot");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig::default();
    let engine = DecisionEngine::new(&league, &valuator, &config, 2);

    // Blended projections after injury discounts: OUT zeroes, QUESTIONABLE
    // keeps most of the value.
    let mut projections = HashMap::new();
    for (id, baseline, blended) in [(1u64, 14.0, 0.0), (2, 12.0, 10.2)] {
        projections.insert(
            id,
            PlayerProjection {
                player_id: id,
                position: Position::Rb,
                baseline,
                blended_mean: blended,
                uncertainty: 4.0,
                confidence: 0.8,
                contributions: Vec::new(),
                warnings: Vec::new(),
            },
        );
    }

    let recommendation = engine
        .recommend_lineup(1, 12, &projections, 0.0)
        .expect("team exists");
    assert_eq!(recommendation.slots.len(), 1);
    let slot = &recommendation.slots[0];
    let picked = slot.recommended.as_ref().expect("never a null slot");
    assert_eq!(picked.player_id, 2, "least-penalized player starts");
    assert!(slot.flagged, "an injured pick must flag the slot");
    assert_eq!(slot.alternatives.len(), 1);
    assert_eq!(recommendation.audit.confidence_level, "high");
}

#[test]
fn positive_risk_lambda_prefers_the_floor_play() {
    use gridiron_alpha::alpha_model::PlayerProjection;
    use std::collections::HashMap;

    let league = league_with(
        vec![
            bare_team(
                1,
                "Mine",
                vec![
                    projected(1, Position::Wr, 12.0),
                    projected(2, Position::Wr, 12.0),
                ],
                14,
            ),
            bare_team(2, "Other", vec![projected(3, Position::Wr, 10.0)], 14),
        ],
        Vec::new(),
        vec!["WR"],
    );

    let store = model("lambda");
    let strength = OpponentStrength::compute(&league);
    let valuator = RosValuator::new(&league, &store, &strength);
    let config = AnalysisConfig::default();
    let engine = DecisionEngine::new(&league, &valuator, &config, 2);

    let mut projections = HashMap::new();
    // Boom-bust player edges the steady one on mean but carries triple the
    // uncertainty.
    for (id, mean, sigma) in [(1u64, 13.0, 9.0), (2, 12.5, 3.0)] {
        projections.insert(
            id,
            PlayerProjection {
                player_id: id,
                position: Position::Wr,
                baseline: 12.0,
                blended_mean: mean,
                uncertainty: sigma,
                confidence: 0.7,
                contributions: Vec::new(),
                warnings: Vec::new(),
            },
        );
    }

    let ceiling = engine.recommend_lineup(1, 12, &projections, 0.0).unwrap();
    assert_eq!(
        ceiling.slots[0].recommended.as_ref().unwrap().player_id,
        1
    );

    let floor = engine.recommend_lineup(1, 12, &projections, 0.5).unwrap();
    assert_eq!(floor.slots[0].recommended.as_ref().unwrap().player_id, 2);
}
