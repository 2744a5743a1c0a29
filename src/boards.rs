//! Canonical board enumeration.
//!
//! Boards are stored per street as card lists whose per-street segments are
//! sorted. A canonical board is the lexicographically smallest image of a
//! board under every suit permutation. Children of a canonical board on the
//! next street are enumerated by dealing every raw combination of new cards,
//! canonicalizing, and grouping equal results. Children of one parent are
//! contiguous, so the descendants of any board on any later street form a
//! contiguous range of global indices.

use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;
use log::debug;
use rayon::prelude::*;

use crate::cards::{Card, Deck, SuitPermutation};
use crate::game::GameDef;

/// Canonical boards of a single street.
#[derive(Debug, Clone, Default)]
pub struct StreetBoards {
    /// Board cards, `num_board_cards(street)` per board.
    pub cards: Vec<Vec<Card>>,
    /// Index of the parent board on the previous street.
    pub parents: Vec<u32>,
    /// Index into the permutation table for every raw deal that collapses
    /// onto this board, one entry per raw variant.
    pub variant_perms: Vec<Vec<u8>>,
    /// Child range on the next street.
    pub children: Vec<Range<u32>>,
}

impl StreetBoards {
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BoardTree {
    pub streets: Vec<StreetBoards>,
    pub perms: Vec<SuitPermutation>,
    segments: Vec<Range<usize>>,
}

impl BoardTree {
    pub fn build(game: &GameDef) -> BoardTree {
        let deck = game.deck;
        let perms = deck.suit_permutations();
        let mut segments = Vec::with_capacity(game.num_streets());
        let mut start = 0;
        for &n in &game.street_cards {
            segments.push(start..start + n);
            start += n;
        }

        let mut streets = vec![StreetBoards {
            cards: vec![Vec::new()],
            parents: vec![0],
            variant_perms: vec![vec![0]],
            children: vec![0..0],
        }];

        for street in 1..game.num_streets() {
            let parents = &streets[street - 1];
            let dealt = game.street_cards[street];
            let per_parent: Vec<Vec<(Vec<Card>, Vec<u8>)>> = parents
                .cards
                .par_iter()
                .map(|parent| deal_children(&deck, &perms, &segments[..=street], parent, dealt))
                .collect();

            let mut next = StreetBoards::default();
            let mut prev_children = Vec::with_capacity(per_parent.len());
            for (parent, children) in per_parent.into_iter().enumerate() {
                let first = next.cards.len() as u32;
                for (cards, variants) in children {
                    next.cards.push(cards);
                    next.parents.push(parent as u32);
                    next.variant_perms.push(variants);
                    next.children.push(0..0);
                }
                prev_children.push(first..next.cards.len() as u32);
            }
            streets[street - 1].children = prev_children;
            debug!("street {}: {} canonical boards", street, next.len());
            streets.push(next);
        }

        BoardTree {
            streets,
            perms,
            segments,
        }
    }

    #[inline]
    pub fn num_boards(&self, street: usize) -> usize {
        self.streets[street].len()
    }

    pub fn board(&self, street: usize, board: usize) -> &[Card] {
        &self.streets[street].cards[board]
    }

    pub fn parent(&self, street: usize, board: usize) -> usize {
        self.streets[street].parents[board] as usize
    }

    pub fn num_variants(&self, street: usize, board: usize) -> usize {
        self.streets[street].variant_perms[board].len()
    }

    /// Suit permutations, one per raw deal, mapping that deal onto `board`.
    pub fn variant_perms(&self, street: usize, board: usize) -> impl Iterator<Item = &SuitPermutation> {
        self.streets[street].variant_perms[board]
            .iter()
            .map(move |&p| &self.perms[p as usize])
    }

    /// Boards on `child_street` descending from `board` on `street`.
    pub fn successor_range(&self, street: usize, board: usize, child_street: usize) -> Range<usize> {
        let mut range = board..board + 1;
        for s in street..child_street {
            if range.is_empty() {
                break;
            }
            let children = &self.streets[s].children;
            let lo = children[range.start].start as usize;
            let hi = children[range.end - 1].end as usize;
            range = lo..hi;
        }
        range
    }

    /// Canonical form of a board together with the index of the first suit
    /// permutation that produces it.
    pub fn canonicalize(&self, deck: &Deck, cards: &[Card]) -> (Vec<Card>, usize) {
        canonical_form(deck, &self.perms, &self.segments, cards)
    }

    /// Global index of an arbitrary board, canonicalizing first.
    pub fn find(&self, deck: &Deck, street: usize, cards: &[Card]) -> Option<usize> {
        let (canonical, _) = self.canonicalize(deck, cards);
        let mut board = 0usize;
        for s in 1..=street {
            let range = self.successor_range(s - 1, board, s);
            let prefix_len = self.segments[s].end;
            board = range
                .clone()
                .find(|&b| self.streets[s].cards[b][..] == canonical[..prefix_len])?;
        }
        Some(board)
    }
}

fn apply(deck: &Deck, perm: &SuitPermutation, segments: &[Range<usize>], cards: &[Card]) -> Vec<Card> {
    let mut out: Vec<Card> = cards.iter().map(|&c| deck.permute(c, perm)).collect();
    for seg in segments {
        if seg.end <= out.len() {
            out[seg.clone()].sort_unstable();
        }
    }
    out
}

fn canonical_form(
    deck: &Deck,
    perms: &[SuitPermutation],
    segments: &[Range<usize>],
    cards: &[Card],
) -> (Vec<Card>, usize) {
    let mut best = apply(deck, &perms[0], segments, cards);
    let mut best_perm = 0;
    for (i, perm) in perms.iter().enumerate().skip(1) {
        let candidate = apply(deck, perm, segments, cards);
        if candidate < best {
            best = candidate;
            best_perm = i;
        }
    }
    (best, best_perm)
}

fn deal_children(
    deck: &Deck,
    perms: &[SuitPermutation],
    segments: &[Range<usize>],
    parent: &[Card],
    dealt: usize,
) -> Vec<(Vec<Card>, Vec<u8>)> {
    let mut groups: BTreeMap<Vec<Card>, Vec<u8>> = BTreeMap::new();
    let remaining: Vec<Card> = deck.cards().filter(|c| !parent.contains(c)).collect();
    for new in remaining.into_iter().combinations(dealt) {
        let mut raw = parent.to_vec();
        raw.extend(new);
        let (canonical, perm) = canonical_form(deck, perms, segments, &raw);
        debug_assert_eq!(&canonical[..parent.len()], parent);
        groups.entry(canonical).or_default().push(perm as u8);
    }
    groups.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::choose;

    #[test]
    fn leduc_has_three_canonical_boards() {
        let game = GameDef::leduc();
        let boards = BoardTree::build(&game);
        assert_eq!(boards.num_boards(1), 3);
        for b in 0..3 {
            assert_eq!(boards.num_variants(1, b), 2);
        }
    }

    #[test]
    fn holdem_flop_count() {
        let game = GameDef::new("flop", 13, 4, 2, vec![0, 3]).unwrap();
        let boards = BoardTree::build(&game);
        assert_eq!(boards.num_boards(1), 1755);
        let total: usize = (0..1755).map(|b| boards.num_variants(1, b)).sum();
        assert_eq!(total, choose(52, 3));
    }

    #[test]
    fn children_extend_their_parent() {
        let game = GameDef::new("small", 4, 3, 1, vec![0, 1, 1]).unwrap();
        let boards = BoardTree::build(&game);
        for b in 0..boards.num_boards(2) {
            let parent = boards.parent(2, b);
            assert_eq!(&boards.board(2, b)[..1], boards.board(1, parent));
        }
    }
}
