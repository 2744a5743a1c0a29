//! Hole-card-pair ranking and per-board hand lists.
//!
//! On a board of street `s` the private holdings are ranked densely over the
//! cards not on the board: with two hole cards `(lo, hi)` the rank is the
//! colexicographic index `hi * (hi - 1) / 2 + lo` of their positions among the
//! remaining cards, with one hole card it is simply that position. A
//! `HoldingKey` is `board * num_hole_card_pairs(street) + rank`.

use std::ops::Range;

use log::info;
use rayon::prelude::*;

use crate::boards::BoardTree;
use crate::cards::{Card, NO_CARD};
use crate::game::GameDef;
use crate::hand_evaluator;

pub type HoldingKey = u64;

/// A private holding. One-card games store `NO_CARD` in the second slot.
pub type Hand = [Card; 2];

/// Showdown data for one final-street board.
#[derive(Debug, Clone)]
pub struct Showdown {
    /// Hand ranks sorted by ascending strength.
    pub order: Vec<u32>,
    /// Strength of each hand, indexed by rank.
    pub strength: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct HoldingIndex {
    pub game: GameDef,
    pub boards: BoardTree,
    showdowns: Vec<Showdown>,
}

impl HoldingIndex {
    pub fn new(game: &GameDef) -> HoldingIndex {
        let boards = BoardTree::build(game);
        let last = game.max_street();
        let showdowns: Vec<Showdown> = (0..boards.num_boards(last))
            .into_par_iter()
            .map(|b| build_showdown(game, &boards, b))
            .collect();
        info!(
            "{}: {} final-street boards, {} holdings each",
            game.name,
            showdowns.len(),
            game.num_hole_card_pairs(last)
        );
        HoldingIndex {
            game: game.clone(),
            boards,
            showdowns,
        }
    }

    #[inline]
    pub fn num_boards(&self, street: usize) -> usize {
        self.boards.num_boards(street)
    }

    #[inline]
    pub fn num_hole_card_pairs(&self, street: usize) -> usize {
        self.game.num_hole_card_pairs(street)
    }

    pub fn canonical_board(&self, street: usize, board: usize) -> &[Card] {
        self.boards.board(street, board)
    }

    pub fn num_variants(&self, street: usize, board: usize) -> usize {
        self.boards.num_variants(street, board)
    }

    pub fn successor_board_range(
        &self,
        parent_street: usize,
        parent_board: usize,
        child_street: usize,
    ) -> Range<usize> {
        self.boards
            .successor_range(parent_street, parent_board, child_street)
    }

    /// Subgame-local board index of a global board. The subgame is rooted
    /// at `(root_street, root_board)`.
    pub fn local_index(
        &self,
        root_street: usize,
        root_board: usize,
        street: usize,
        global_board: usize,
    ) -> usize {
        let range = self.successor_board_range(root_street, root_board, street);
        debug_assert!(range.contains(&global_board));
        global_board - range.start
    }

    pub fn global_index(
        &self,
        root_street: usize,
        root_board: usize,
        street: usize,
        local_board: usize,
    ) -> usize {
        self.successor_board_range(root_street, root_board, street)
            .start
            + local_board
    }

    /// Rank of `hand` on `board`, or None if it shares a card with it.
    pub fn hole_card_pair_rank(&self, board: &[Card], hand: &Hand) -> Option<usize> {
        let position = |card: Card| -> Option<usize> {
            if board.contains(&card) {
                return None;
            }
            Some(card.index() - board.iter().filter(|&&b| b < card).count())
        };
        if self.game.num_hole_cards == 1 {
            return position(hand[0]);
        }
        let (lo, hi) = if hand[0] < hand[1] {
            (hand[0], hand[1])
        } else {
            (hand[1], hand[0])
        };
        if lo == hi {
            return None;
        }
        let (i, j) = (position(lo)?, position(hi)?);
        Some(j * (j - 1) / 2 + i)
    }

    pub fn holding_key(&self, street: usize, board: usize, rank: usize) -> HoldingKey {
        (board * self.num_hole_card_pairs(street) + rank) as HoldingKey
    }

    /// Every holding on `board`, in rank order.
    pub fn board_hands(&self, board: &[Card]) -> Vec<Hand> {
        let remaining: Vec<Card> = self
            .game
            .deck
            .cards()
            .filter(|c| !board.contains(c))
            .collect();
        if self.game.num_hole_cards == 1 {
            return remaining.into_iter().map(|c| [c, NO_CARD]).collect();
        }
        let mut hands = Vec::with_capacity(remaining.len() * (remaining.len() - 1) / 2);
        for (j, &hi) in remaining.iter().enumerate() {
            for &lo in &remaining[..j] {
                hands.push([lo, hi]);
            }
        }
        hands
    }

    pub fn hands(&self, street: usize, board: usize) -> Vec<Hand> {
        self.board_hands(self.canonical_board(street, board))
    }

    pub fn showdown(&self, board: usize) -> &Showdown {
        &self.showdowns[board]
    }
}

fn build_showdown(game: &GameDef, boards: &BoardTree, board: usize) -> Showdown {
    let street = game.max_street();
    let cards = boards.board(street, board);
    let remaining: Vec<Card> = game.deck.cards().filter(|c| !cards.contains(c)).collect();
    let mut strength = Vec::with_capacity(game.num_hole_card_pairs(street));
    if game.num_hole_cards == 1 {
        for &c in &remaining {
            strength.push(hand_evaluator::strength(&game.deck, &[c], cards));
        }
    } else {
        for (j, &hi) in remaining.iter().enumerate() {
            for &lo in &remaining[..j] {
                strength.push(hand_evaluator::strength(&game.deck, &[lo, hi], cards));
            }
        }
    }
    let mut order: Vec<u32> = (0..strength.len() as u32).collect();
    order.sort_by_key(|&h| strength[h as usize]);
    Showdown { order, strength }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_match_board_hand_order() {
        let game = GameDef::new("small", 4, 2, 2, vec![0, 1]).unwrap();
        let index = HoldingIndex::new(&game);
        for b in 0..index.num_boards(1) {
            let board = index.canonical_board(1, b).to_vec();
            let hands = index.board_hands(&board);
            assert_eq!(hands.len(), game.num_hole_card_pairs(1));
            for (rank, hand) in hands.iter().enumerate() {
                assert_eq!(index.hole_card_pair_rank(&board, hand), Some(rank));
            }
        }
    }

    #[test]
    fn conflicting_hand_has_no_rank() {
        let index = HoldingIndex::new(&GameDef::leduc());
        let board = index.canonical_board(1, 0).to_vec();
        assert_eq!(index.hole_card_pair_rank(&board, &[board[0], NO_CARD]), None);
    }

    #[test]
    fn showdown_order_is_ascending() {
        let index = HoldingIndex::new(&GameDef::leduc());
        for b in 0..index.num_boards(1) {
            let sd = index.showdown(b);
            for w in sd.order.windows(2) {
                assert!(sd.strength[w[0] as usize] <= sd.strength[w[1] as usize]);
            }
        }
    }
}
