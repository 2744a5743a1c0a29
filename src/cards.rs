//! Cards over a configurable deck.
//!
//! A deck has `num_ranks` ranks and `num_suits` suits. Cards are dense
//! indices `rank * num_suits + suit`, so sorting cards sorts by rank first.
//! A full deck runs 2 to A; shorter decks end at K, so a 3-rank deck is
//! J, Q, K.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{CfrError, CfrResult};

pub const RANKS_STR: &str = "23456789TJQKA";
pub const SUITS_STR: &str = "shdc";
pub const MAX_DECK: usize = 52;

/// Placeholder for the absent second hole card in one-card games.
pub const NO_CARD: Card = Card(u8::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Card(pub u8);

impl Card {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == NO_CARD
    }
}

/// Shape of the deck: how many ranks and suits it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub num_ranks: u8,
    pub num_suits: u8,
}

impl Deck {
    pub fn new(num_ranks: u8, num_suits: u8) -> CfrResult<Deck> {
        if num_ranks == 0 || num_ranks as usize > RANKS_STR.len() {
            return Err(CfrError::InvalidGame(format!(
                "rank count {} outside 1..=13",
                num_ranks
            )));
        }
        if num_suits == 0 || num_suits as usize > SUITS_STR.len() {
            return Err(CfrError::InvalidGame(format!(
                "suit count {} outside 1..=4",
                num_suits
            )));
        }
        Ok(Deck {
            num_ranks,
            num_suits,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.num_ranks as usize * self.num_suits as usize
    }

    #[inline]
    pub fn card(&self, rank: u8, suit: u8) -> Card {
        Card(rank * self.num_suits + suit)
    }

    #[inline]
    pub fn rank(&self, card: Card) -> u8 {
        card.0 / self.num_suits
    }

    #[inline]
    pub fn suit(&self, card: Card) -> u8 {
        card.0 % self.num_suits
    }

    pub fn cards(&self) -> impl Iterator<Item = Card> {
        (0..self.size() as u8).map(Card)
    }

    /// Position of this deck's lowest rank in `RANKS_STR`.
    pub fn rank_offset(&self) -> usize {
        let n = self.num_ranks as usize;
        if n == RANKS_STR.len() {
            0
        } else {
            RANKS_STR.len() - 1 - n
        }
    }

    pub fn rank_char(&self, rank: u8) -> char {
        RANKS_STR.as_bytes()[self.rank_offset() + rank as usize] as char
    }

    pub fn suit_char(&self, suit: u8) -> char {
        SUITS_STR.as_bytes()[suit as usize] as char
    }

    pub fn format_card(&self, card: Card) -> String {
        if card.is_none() {
            return String::new();
        }
        format!(
            "{}{}",
            self.rank_char(self.rank(card)),
            self.suit_char(self.suit(card))
        )
    }

    pub fn format_cards(&self, cards: &[Card]) -> String {
        cards
            .iter()
            .filter(|c| !c.is_none())
            .map(|&c| self.format_card(c))
            .collect()
    }

    pub fn parse_card(&self, notation: &str) -> CfrResult<Card> {
        let notation = notation.trim();
        let chars: Vec<char> = notation.chars().collect();
        if chars.len() != 2 {
            return Err(CfrError::InvalidCard(notation.to_string()));
        }
        let offset = self.rank_offset();
        let rank = RANKS_STR
            .find(chars[0].to_ascii_uppercase())
            .filter(|&r| r >= offset && r < offset + self.num_ranks as usize)
            .map(|r| (r - offset) as u8)
            .ok_or_else(|| CfrError::InvalidCard(notation.to_string()))?;
        let suit = SUITS_STR
            .find(chars[1].to_ascii_lowercase())
            .filter(|&s| s < self.num_suits as usize)
            .map(|s| s as u8)
            .ok_or_else(|| CfrError::InvalidCard(notation.to_string()))?;
        Ok(self.card(rank, suit))
    }

    pub fn parse_cards(&self, notation: &str) -> CfrResult<Vec<Card>> {
        let notation = notation.trim().replace([' ', ','], "");
        if notation.len() % 2 != 0 {
            return Err(CfrError::InvalidCard(notation));
        }
        let chars: Vec<char> = notation.chars().collect();
        chars
            .chunks(2)
            .map(|pair| self.parse_card(&pair.iter().collect::<String>()))
            .collect()
    }

    /// Every permutation of the suits, identity first.
    pub fn suit_permutations(&self) -> Vec<SuitPermutation> {
        (0..self.num_suits)
            .permutations(self.num_suits as usize)
            .map(|map| SuitPermutation { map })
            .collect()
    }

    #[inline]
    pub fn permute(&self, card: Card, perm: &SuitPermutation) -> Card {
        if card.is_none() {
            return card;
        }
        self.card(self.rank(card), perm.map[self.suit(card) as usize])
    }
}

/// A relabelling of suits; `map[s]` is the image of suit `s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitPermutation {
    pub map: Vec<u8>,
}

impl SuitPermutation {
    pub fn is_identity(&self) -> bool {
        self.map.iter().enumerate().all(|(i, &s)| i == s as usize)
    }

    pub fn inverse(&self) -> SuitPermutation {
        let mut map = vec![0u8; self.map.len()];
        for (from, &to) in self.map.iter().enumerate() {
            map[to as usize] = from as u8;
        }
        SuitPermutation { map }
    }
}

impl fmt::Display for SuitPermutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (from, &to) in self.map.iter().enumerate() {
            let a = SUITS_STR.as_bytes()[from] as char;
            let b = SUITS_STR.as_bytes()[to as usize] as char;
            write!(f, "{}{}", a, b)?;
            if from + 1 < self.map.len() {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_deck_ends_at_king() {
        let deck = Deck::new(3, 2).unwrap();
        assert_eq!(deck.size(), 6);
        assert_eq!(deck.format_card(Card(0)), "Js");
        assert_eq!(deck.format_card(Card(1)), "Jh");
        assert_eq!(deck.format_card(Card(5)), "Kh");
    }

    #[test]
    fn parse_rejects_ranks_outside_deck() {
        let deck = Deck::new(3, 2).unwrap();
        assert!(deck.parse_card("Ts").is_err());
        assert!(deck.parse_card("Kd").is_err());
        assert_eq!(deck.parse_card("Qh").unwrap(), Card(3));
    }

    #[test]
    fn permutations_start_with_identity() {
        let deck = Deck::new(13, 4).unwrap();
        let perms = deck.suit_permutations();
        assert_eq!(perms.len(), 24);
        assert!(perms[0].is_identity());
    }

    #[test]
    fn inverse_undoes_permutation() {
        let deck = Deck::new(13, 4).unwrap();
        for perm in deck.suit_permutations() {
            let inv = perm.inverse();
            for card in deck.cards() {
                assert_eq!(deck.permute(deck.permute(card, &perm), &inv), card);
            }
        }
    }
}
