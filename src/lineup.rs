// Lineup slots and greedy optimal-lineup construction.

use crate::league::{Player, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Fixed(Position),
    Flex,
}

impl Slot {
    pub fn parse(raw: &str) -> Option<Slot> {
        let token = raw.trim().to_ascii_uppercase();
        if token == "FLEX" {
            return Some(Slot::Flex);
        }
        Position::parse(&token).map(Slot::Fixed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Slot::Fixed(position) => position.as_str(),
            Slot::Flex => "FLEX",
        }
    }

    pub fn eligible(&self, player: &Player) -> bool {
        match self {
            Slot::Fixed(position) => player.position == *position,
            Slot::Flex => matches!(
                player.position,
                Position::Rb | Position::Wr | Position::Te
            ),
        }
    }
}

/// Parse the league's configured slot strings, dropping anything unknown.
pub fn slots_from_settings(raw_slots: &[String]) -> Vec<Slot> {
    raw_slots.iter().filter_map(|s| Slot::parse(s)).collect()
}

/// Greedy fill: walk the slot template in order and take the best-scoring
/// eligible player for each slot. A slot with no eligible player is skipped
/// (the caller flags it), never filled with a null.
pub fn optimal_lineup<'a, F>(roster: &'a [Player], slots: &[Slot], mut score: F) -> Vec<&'a Player>
where
    F: FnMut(&Player) -> f64,
{
    let mut selected: Vec<&Player> = Vec::with_capacity(slots.len());
    let mut used: Vec<u64> = Vec::with_capacity(slots.len());

    for slot in slots {
        let best = roster
            .iter()
            .filter(|p| !used.contains(&p.player_id) && slot.eligible(p))
            .map(|p| (p, score(p)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((player, _)) = best {
            used.push(player.player_id);
            selected.push(player);
        }
    }

    selected
}

/// Pair each filled slot with its label; unfilled slots are reported too.
pub fn lineup_by_slot<'a, F>(
    roster: &'a [Player],
    slots: &[Slot],
    mut score: F,
) -> Vec<(Slot, Option<&'a Player>)>
where
    F: FnMut(&Player) -> f64,
{
    let mut out = Vec::with_capacity(slots.len());
    let mut used: Vec<u64> = Vec::with_capacity(slots.len());

    for slot in slots {
        let best = roster
            .iter()
            .filter(|p| !used.contains(&p.player_id) && slot.eligible(p))
            .map(|p| (p, score(p)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        match best {
            Some((player, _)) => {
                used.push(player.player_id);
                out.push((*slot, Some(player)));
            }
            None => out.push((*slot, None)),
        }
    }

    out
}

/// Roster members that did not make the lineup.
pub fn bench<'a>(roster: &'a [Player], starters: &[&Player]) -> Vec<&'a Player> {
    roster
        .iter()
        .filter(|p| !starters.iter().any(|s| s.player_id == p.player_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::default_lineup_slots;
    use std::collections::BTreeMap;

    fn player(id: u64, position: Position, projection: f64) -> Player {
        Player {
            player_id: id,
            name: format!("P{id}"),
            position,
            pro_team: String::new(),
            stats: BTreeMap::new(),
            schedule: BTreeMap::new(),
            injury_status: None,
            active: true,
            percent_started: 50.0,
            percent_owned: 50.0,
            projected_avg_points: projection,
            projected_total_points: 0.0,
            avg_points: projection,
            lineup_slot: None,
        }
    }

    fn standard_slots() -> Vec<Slot> {
        slots_from_settings(&default_lineup_slots())
    }

    #[test]
    fn default_template_parses_fully() {
        assert_eq!(standard_slots().len(), 9);
    }

    #[test]
    fn flex_takes_best_remaining_skill_player() {
        let roster = vec![
            player(1, Position::Qb, 20.0),
            player(2, Position::Rb, 15.0),
            player(3, Position::Rb, 14.0),
            player(4, Position::Rb, 13.0),
            player(5, Position::Wr, 12.0),
            player(6, Position::Wr, 11.0),
            player(7, Position::Te, 8.0),
            player(8, Position::K, 7.0),
            player(9, Position::Def, 6.0),
            player(10, Position::Wr, 5.0),
        ];
        let lineup = optimal_lineup(&roster, &standard_slots(), |p| p.projected_avg_points);
        assert_eq!(lineup.len(), 9);
        // Third RB (13.0) should claim FLEX over the fourth WR (5.0).
        assert!(lineup.iter().any(|p| p.player_id == 4));
        assert!(!lineup.iter().any(|p| p.player_id == 10));
    }

    #[test]
    fn unfillable_slot_is_reported_not_faked() {
        let roster = vec![player(1, Position::Qb, 20.0)];
        let rows = lineup_by_slot(&roster, &standard_slots(), |p| p.projected_avg_points);
        let filled = rows.iter().filter(|(_, p)| p.is_some()).count();
        assert_eq!(filled, 1);
        assert!(rows.iter().any(|(slot, p)| *slot == Slot::Flex && p.is_none()));
    }

    #[test]
    fn bench_is_the_complement_of_the_lineup() {
        let roster = vec![
            player(1, Position::Rb, 15.0),
            player(2, Position::Rb, 14.0),
            player(3, Position::Rb, 13.0),
        ];
        let slots = vec![Slot::Fixed(Position::Rb), Slot::Fixed(Position::Rb)];
        let lineup = optimal_lineup(&roster, &slots, |p| p.projected_avg_points);
        let bench = bench(&roster, &lineup);
        assert_eq!(bench.len(), 1);
        assert_eq!(bench[0].player_id, 3);
    }

    #[test]
    fn a_player_fills_only_one_slot() {
        let roster = vec![player(1, Position::Rb, 15.0)];
        let slots = vec![Slot::Fixed(Position::Rb), Slot::Flex];
        let lineup = optimal_lineup(&roster, &slots, |p| p.projected_avg_points);
        assert_eq!(lineup.len(), 1);
    }
}
