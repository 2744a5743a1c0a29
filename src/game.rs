//! Game definition: deck shape, hole cards and how many board cards each
//! street deals.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cards::{Deck, MAX_DECK};
use crate::error::{CfrError, CfrResult};
use crate::tree_builder::BettingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDef {
    pub name: String,
    pub deck: Deck,
    pub num_hole_cards: usize,
    /// Board cards dealt at the start of each street; `street_cards[0]` is 0.
    pub street_cards: Vec<usize>,
}

impl GameDef {
    pub fn new(
        name: &str,
        num_ranks: u8,
        num_suits: u8,
        num_hole_cards: usize,
        street_cards: Vec<usize>,
    ) -> CfrResult<GameDef> {
        let game = GameDef {
            name: name.to_string(),
            deck: Deck::new(num_ranks, num_suits)?,
            num_hole_cards,
            street_cards,
        };
        game.validate()?;
        Ok(game)
    }

    pub fn validate(&self) -> CfrResult<()> {
        if !(1..=2).contains(&self.num_hole_cards) {
            return Err(CfrError::InvalidGame(format!(
                "{} hole cards; only 1 or 2 are supported",
                self.num_hole_cards
            )));
        }
        if self.street_cards.is_empty() {
            return Err(CfrError::InvalidGame("no streets".to_string()));
        }
        if self.street_cards[0] != 0 {
            return Err(CfrError::InvalidGame(
                "the first street cannot deal board cards".to_string(),
            ));
        }
        if self.street_cards[1..].iter().any(|&n| n == 0) {
            return Err(CfrError::InvalidGame(
                "every later street must deal at least one card".to_string(),
            ));
        }
        if self.deck.size() > MAX_DECK {
            return Err(CfrError::InvalidGame("deck larger than 52 cards".to_string()));
        }
        let needed = self.num_board_cards(self.max_street()) + 2 * self.num_hole_cards;
        if needed > self.deck.size() {
            return Err(CfrError::InvalidGame(format!(
                "{} cards needed but the deck has {}",
                needed,
                self.deck.size()
            )));
        }
        Ok(())
    }

    /// Kuhn poker: J, Q, K, one card each, no board.
    pub fn kuhn() -> GameDef {
        GameDef {
            name: "kuhn".to_string(),
            deck: Deck {
                num_ranks: 3,
                num_suits: 1,
            },
            num_hole_cards: 1,
            street_cards: vec![0],
        }
    }

    /// Leduc hold'em: two suits of J, Q, K, one hole card, one board card.
    pub fn leduc() -> GameDef {
        GameDef {
            name: "leduc".to_string(),
            deck: Deck {
                num_ranks: 3,
                num_suits: 2,
            },
            num_hole_cards: 1,
            street_cards: vec![0, 1],
        }
    }

    #[inline]
    pub fn max_street(&self) -> usize {
        self.street_cards.len() - 1
    }

    #[inline]
    pub fn num_streets(&self) -> usize {
        self.street_cards.len()
    }

    pub fn num_board_cards(&self, street: usize) -> usize {
        self.street_cards[..=street].iter().sum()
    }

    /// Distinct private holdings on any board of `street`.
    pub fn num_hole_card_pairs(&self, street: usize) -> usize {
        choose(
            self.deck.size() - self.num_board_cards(street),
            self.num_hole_cards,
        )
    }

    /// Opponent holdings that are card-disjoint from one of ours.
    pub fn num_opponent_holdings(&self, street: usize) -> usize {
        choose(
            self.deck.size() - self.num_board_cards(street) - self.num_hole_cards,
            self.num_hole_cards,
        )
    }

    /// Raw deals for the street after `street` once both players hold cards.
    pub fn num_deals(&self, street: usize) -> usize {
        let remaining =
            self.deck.size() - self.num_board_cards(street) - 2 * self.num_hole_cards;
        choose(remaining, self.street_cards[street + 1])
    }
}

/// Game definition plus betting structure, as loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSpec {
    pub game: GameDef,
    pub betting: BettingConfig,
}

impl GameSpec {
    pub fn kuhn() -> GameSpec {
        GameSpec {
            game: GameDef::kuhn(),
            betting: BettingConfig::kuhn(),
        }
    }

    pub fn leduc() -> GameSpec {
        GameSpec {
            game: GameDef::leduc(),
            betting: BettingConfig::leduc(),
        }
    }

    pub fn from_file(path: &Path) -> CfrResult<GameSpec> {
        let json = std::fs::read_to_string(path)?;
        let spec: GameSpec = serde_json::from_str(&json)?;
        spec.game.validate()?;
        spec.betting.validate(&spec.game)?;
        Ok(spec)
    }
}

pub fn choose(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result = 1usize;
    for i in 0..k {
        result = result * (n - i) / (i + 1);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_small_values() {
        assert_eq!(choose(52, 2), 1326);
        assert_eq!(choose(50, 3), 19600);
        assert_eq!(choose(3, 4), 0);
        assert_eq!(choose(5, 0), 1);
    }

    #[test]
    fn leduc_counts() {
        let game = GameDef::leduc();
        assert_eq!(game.num_hole_card_pairs(0), 6);
        assert_eq!(game.num_hole_card_pairs(1), 5);
        assert_eq!(game.num_opponent_holdings(0), 5);
        assert_eq!(game.num_deals(0), 4);
    }

    #[test]
    fn rejects_three_hole_cards() {
        assert!(GameDef::new("bad", 13, 4, 3, vec![0, 3]).is_err());
    }

    #[test]
    fn rejects_board_on_first_street() {
        assert!(GameDef::new("bad", 13, 4, 2, vec![3]).is_err());
    }
}
