//! Win conditions.
//!
//! A match ends when a King tower falls, when a player surrenders, or when
//! the clock runs past regular time plus overtime. On time, the side that
//! destroyed more enemy towers wins; equal counts are a draw.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Team};
use crate::config::TimingConfig;
use crate::math::Fixed;
use crate::towers::{Tower, TowerKind};

/// Final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    /// Red won.
    Red,
    /// Blue won.
    Blue,
    /// Nobody won.
    Draw,
}

impl From<Team> for Winner {
    fn from(team: Team) -> Self {
        match team {
            Team::Red => Winner::Red,
            Team::Blue => Winner::Blue,
        }
    }
}

/// Why the match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A King tower was destroyed.
    KingDestroyed,
    /// The clock ran out.
    TimeLimit,
    /// A player gave up.
    Surrender,
}

/// Winner plus reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Who won.
    pub winner: Winner,
    /// How.
    pub reason: EndReason,
}

/// Towers destroyed by `team`, i.e. dead towers of the other side.
#[must_use]
pub fn crowns_for(team: Team, towers: &BTreeMap<EntityId, Tower>) -> u32 {
    towers
        .values()
        .filter(|tower| tower.team != team && !tower.is_alive)
        .count() as u32
}

/// Compare crown counts.
#[must_use]
pub const fn decide_by_crowns(red: u32, blue: u32) -> Winner {
    if red > blue {
        Winner::Red
    } else if blue > red {
        Winner::Blue
    } else {
        Winner::Draw
    }
}

/// Check the King towers. Red's King is checked first.
#[must_use]
pub fn king_verdict(towers: &BTreeMap<EntityId, Tower>) -> Option<MatchOutcome> {
    for team in Team::ALL {
        let fallen = towers
            .values()
            .any(|tower| tower.team == team && tower.kind() == TowerKind::King && !tower.is_alive);
        if fallen {
            return Some(MatchOutcome {
                winner: team.opponent().into(),
                reason: EndReason::KingDestroyed,
            });
        }
    }
    None
}

/// Full end-of-tick evaluation.
#[must_use]
pub fn evaluate(
    towers: &BTreeMap<EntityId, Tower>,
    elapsed: Fixed,
    timing: &TimingConfig,
) -> Option<MatchOutcome> {
    if let Some(outcome) = king_verdict(towers) {
        return Some(outcome);
    }
    if elapsed >= timing.time_limit() {
        return Some(MatchOutcome {
            winner: decide_by_crowns(crowns_for(Team::Red, towers), crowns_for(Team::Blue, towers)),
            reason: EndReason::TimeLimit,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::towers::{TowerCatalog, TowerSlot};

    fn board() -> BTreeMap<EntityId, Tower> {
        let catalog = TowerCatalog::default();
        let mut towers = BTreeMap::new();
        let mut id = 1;
        for team in Team::ALL {
            for slot in TowerSlot::ALL {
                towers.insert(id, Tower::new(id, slot, team, &catalog));
                id += 1;
            }
        }
        towers
    }

    fn destroy(towers: &mut BTreeMap<EntityId, Tower>, id: EntityId) {
        if let Some(tower) = towers.get_mut(&id) {
            tower.take_damage(u32::MAX);
        }
    }

    #[test]
    fn test_no_verdict_mid_match() {
        let towers = board();
        assert!(evaluate(&towers, Fixed::from_num(30), &TimingConfig::default()).is_none());
    }

    #[test]
    fn test_king_destroyed() {
        let mut towers = board();
        destroy(&mut towers, 4);
        let outcome = evaluate(&towers, Fixed::from_num(30), &TimingConfig::default()).unwrap();
        assert_eq!(outcome.winner, Winner::Red);
        assert_eq!(outcome.reason, EndReason::KingDestroyed);
    }

    #[test]
    fn test_time_limit_by_crowns() {
        let mut towers = board();
        destroy(&mut towers, 5);
        destroy(&mut towers, 6);
        destroy(&mut towers, 2);
        assert_eq!(crowns_for(Team::Red, &towers), 2);
        assert_eq!(crowns_for(Team::Blue, &towers), 1);

        let outcome = evaluate(&towers, Fixed::from_num(240), &TimingConfig::default()).unwrap();
        assert_eq!(outcome.winner, Winner::Red);
        assert_eq!(outcome.reason, EndReason::TimeLimit);
    }

    #[test]
    fn test_equal_crowns_draw() {
        assert_eq!(decide_by_crowns(1, 1), Winner::Draw);
        assert_eq!(decide_by_crowns(0, 0), Winner::Draw);
        assert_eq!(decide_by_crowns(0, 3), Winner::Blue);
    }
}
