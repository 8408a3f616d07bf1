//! Elixir economy and player records.
//!
//! Elixir is continuous and regenerates with the match clock. Cards are
//! paid for in whole elixir; the fractional part keeps accruing.

use serde::{Deserialize, Serialize};

use crate::components::Team;
use crate::math::{fixed_decimal, fixed_serde, Fixed};

/// Elixir tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElixirConfig {
    /// Elixir each player starts with.
    #[serde(with = "fixed_decimal")]
    pub initial: Fixed,
    /// Hard cap.
    #[serde(with = "fixed_decimal")]
    pub max: Fixed,
    /// Elixir per second.
    #[serde(with = "fixed_decimal")]
    pub regen_rate: Fixed,
    /// Regen multiplier once the match is in overtime.
    #[serde(with = "fixed_decimal")]
    pub overtime_multiplier: Fixed,
}

impl Default for ElixirConfig {
    fn default() -> Self {
        Self {
            initial: Fixed::from_num(5),
            max: Fixed::from_num(10),
            regen_rate: Fixed::from_num(1) / Fixed::from_num(2.8),
            overtime_multiplier: Fixed::from_num(2),
        }
    }
}

/// A participant in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable player id supplied by the session layer.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Side the player deploys for.
    pub team: Team,
    /// Current elixir, in `[0, max_elixir]`.
    #[serde(with = "fixed_serde")]
    pub elixir: Fixed,
    /// Elixir cap.
    #[serde(with = "fixed_serde")]
    pub max_elixir: Fixed,
    /// Enemy towers destroyed so far.
    pub crowns: u32,
    /// Whether the player is connected. Disconnected players do not regenerate.
    pub connected: bool,
    /// Match clock (seconds) of the last accepted card.
    #[serde(with = "fixed_serde")]
    pub last_action: Fixed,
}

impl Player {
    /// Create a connected player with starting elixir.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, team: Team, elixir: &ElixirConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            team,
            elixir: elixir.initial.min(elixir.max),
            max_elixir: elixir.max,
            crowns: 0,
            connected: true,
            last_action: Fixed::ZERO,
        }
    }

    /// Accrue elixir for `seconds` at `rate`, clamped to the cap.
    ///
    /// Returns the amount actually gained.
    pub fn regenerate(&mut self, rate: Fixed, seconds: Fixed) -> Fixed {
        if self.elixir >= self.max_elixir {
            return Fixed::ZERO;
        }
        let gain = rate.saturating_mul(seconds).max(Fixed::ZERO);
        let before = self.elixir;
        self.elixir = self.elixir.saturating_add(gain).min(self.max_elixir);
        self.elixir - before
    }

    /// Whole elixir available.
    #[must_use]
    pub fn whole_elixir(&self) -> u32 {
        self.elixir.floor().to_num::<i64>().max(0) as u32
    }

    /// Check whether a card of this cost is affordable.
    #[must_use]
    pub fn can_afford(&self, cost: u32) -> bool {
        self.elixir >= Fixed::from_num(cost)
    }

    /// Spend elixir if available.
    ///
    /// Returns true if the transaction succeeded.
    pub fn spend(&mut self, cost: u32, now: Fixed) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.elixir -= Fixed::from_num(cost);
        self.last_action = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_player() -> Player {
        Player::new("p1", "Alice", Team::Red, &ElixirConfig::default())
    }

    #[test]
    fn test_new_player_defaults() {
        let player = red_player();
        assert_eq!(player.elixir, Fixed::from_num(5));
        assert_eq!(player.crowns, 0);
        assert!(player.connected);
    }

    #[test]
    fn test_regen_clamps_to_max() {
        let mut player = red_player();
        let gained = player.regenerate(Fixed::from_num(1), Fixed::from_num(3));
        assert_eq!(gained, Fixed::from_num(3));

        let gained = player.regenerate(Fixed::from_num(1), Fixed::from_num(100));
        assert_eq!(gained, Fixed::from_num(2));
        assert_eq!(player.elixir, player.max_elixir);

        assert_eq!(player.regenerate(Fixed::from_num(1), Fixed::from_num(1)), Fixed::ZERO);
    }

    #[test]
    fn test_spend() {
        let mut player = red_player();
        assert!(!player.spend(6, Fixed::ZERO));
        assert_eq!(player.elixir, Fixed::from_num(5));

        assert!(player.spend(5, Fixed::from_num(12)));
        assert_eq!(player.elixir, Fixed::ZERO);
        assert_eq!(player.last_action, Fixed::from_num(12));
    }

    #[test]
    fn test_whole_elixir_floors() {
        let mut player = red_player();
        player.elixir = Fixed::from_num(3.9);
        assert_eq!(player.whole_elixir(), 3);
        assert!(!player.can_afford(4));
    }
}
