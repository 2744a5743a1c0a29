use std::cmp::Ordering;
use std::fmt;

use itertools::Itertools;

use crate::cards::{Card, Deck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandCategory {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
    RoyalFlush = 9,
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandCategory::HighCard => write!(f, "High Card"),
            HandCategory::OnePair => write!(f, "One Pair"),
            HandCategory::TwoPair => write!(f, "Two Pair"),
            HandCategory::ThreeOfAKind => write!(f, "Three of a Kind"),
            HandCategory::Straight => write!(f, "Straight"),
            HandCategory::Flush => write!(f, "Flush"),
            HandCategory::FullHouse => write!(f, "Full House"),
            HandCategory::FourOfAKind => write!(f, "Four of a Kind"),
            HandCategory::StraightFlush => write!(f, "Straight Flush"),
            HandCategory::RoyalFlush => write!(f, "Royal Flush"),
        }
    }
}

/// Category plus tie-breaking values, highest first. Values are on the
/// standard 2..=14 scale, matching the card's printed rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandResult {
    pub category: HandCategory,
    pub kickers: Vec<u8>,
}

impl HandResult {
    /// Packed strength; larger wins, equal ties.
    pub fn strength(&self) -> u32 {
        let mut packed = 0u32;
        for i in 0..5 {
            let v = self.kickers.get(i).copied().unwrap_or(0) as u32;
            packed = (packed << 4) | v;
        }
        ((self.category as u32) << 20) | packed
    }
}

impl fmt::Display for HandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category)
    }
}

impl PartialOrd for HandResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| self.kickers.cmp(&other.kickers))
    }
}

fn value_of(deck: &Deck, card: Card) -> u8 {
    (deck.rank_offset() + 2) as u8 + deck.rank(card)
}

fn straight_high(values: &[u8]) -> Option<u8> {
    let unique: Vec<u8> = values
        .iter()
        .copied()
        .sorted_unstable_by(|a, b| b.cmp(a))
        .dedup()
        .collect();
    if unique.len() != 5 {
        return None;
    }
    if unique[0] - unique[4] == 4 {
        return Some(unique[0]);
    }
    // Wheel: A-2-3-4-5
    if unique == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

/// Evaluates exactly the given cards (at most five). Straights and flushes
/// need five cards.
fn evaluate_group(deck: &Deck, cards: &[Card]) -> HandResult {
    let mut values: Vec<u8> = cards.iter().map(|&c| value_of(deck, c)).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let five = cards.len() == 5;
    let flush = five && cards.iter().map(|&c| deck.suit(c)).all_equal();
    let straight = if five { straight_high(&values) } else { None };

    if flush {
        if let Some(high) = straight {
            let category = if high == 14 {
                HandCategory::RoyalFlush
            } else {
                HandCategory::StraightFlush
            };
            return HandResult {
                category,
                kickers: vec![high],
            };
        }
    }

    // (count, value) by count desc, then value desc
    let mut counts = [0u8; 15];
    for &v in &values {
        counts[v as usize] += 1;
    }
    let freq: Vec<(u8, u8)> = (2..=14u8)
        .rev()
        .filter(|&v| counts[v as usize] > 0)
        .map(|v| (counts[v as usize], v))
        .sorted_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)))
        .collect();
    let grouped: Vec<u8> = freq.iter().map(|&(_, v)| v).collect();

    let category = match (freq[0].0, freq.get(1).map_or(0, |f| f.0)) {
        (4, _) => HandCategory::FourOfAKind,
        (3, 2) => HandCategory::FullHouse,
        _ if flush => HandCategory::Flush,
        _ if straight.is_some() => HandCategory::Straight,
        (3, _) => HandCategory::ThreeOfAKind,
        (2, 2) => HandCategory::TwoPair,
        (2, _) => HandCategory::OnePair,
        _ => HandCategory::HighCard,
    };
    let kickers = match category {
        HandCategory::Straight => vec![straight.unwrap_or(0)],
        HandCategory::Flush | HandCategory::HighCard => values,
        _ => grouped,
    };
    HandResult { category, kickers }
}

/// Best hand that can be made from `cards` (1 to 7 of them).
pub fn evaluate(deck: &Deck, cards: &[Card]) -> HandResult {
    assert!(
        (1..=7).contains(&cards.len()),
        "cannot evaluate {} cards",
        cards.len()
    );
    if cards.len() <= 5 {
        return evaluate_group(deck, cards);
    }
    cards
        .iter()
        .copied()
        .combinations(5)
        .map(|five| evaluate_group(deck, &five))
        .max()
        .unwrap_or_else(|| evaluate_group(deck, &cards[..5]))
}

pub fn strength(deck: &Deck, hole: &[Card], board: &[Card]) -> u32 {
    let all: Vec<Card> = hole
        .iter()
        .chain(board.iter())
        .copied()
        .filter(|c| !c.is_none())
        .collect();
    evaluate(deck, &all).strength()
}

pub fn compare_hands(deck: &Deck, hand1: &[Card], hand2: &[Card], board: &[Card]) -> Ordering {
    strength(deck, hand1, board).cmp(&strength(deck, hand2, board))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leduc_pair_beats_high_card() {
        let deck = Deck::new(3, 2).unwrap();
        let board = deck.parse_cards("Js").unwrap();
        let jack = deck.parse_cards("Jh").unwrap();
        let king = deck.parse_cards("Kh").unwrap();
        assert_eq!(compare_hands(&deck, &jack, &king, &board), Ordering::Greater);
    }

    #[test]
    fn leduc_high_card_ordering() {
        let deck = Deck::new(3, 2).unwrap();
        let board = deck.parse_cards("Qs").unwrap();
        let king = deck.parse_cards("Kh").unwrap();
        let jack = deck.parse_cards("Jh").unwrap();
        assert_eq!(compare_hands(&deck, &king, &jack, &board), Ordering::Greater);
    }

    #[test]
    fn strength_packs_category_above_kickers() {
        let deck = Deck::new(13, 4).unwrap();
        let cards = deck.parse_cards("AsKsQsJsTs").unwrap();
        let result = evaluate(&deck, &cards);
        assert_eq!(result.category, HandCategory::RoyalFlush);
        let pair = evaluate(&deck, &deck.parse_cards("2s2h").unwrap());
        assert!(result.strength() > pair.strength());
    }
}
