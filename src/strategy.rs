//! Average-strategy lookup for callers that play the solved game: given a
//! node, the raw board and our hole cards, which actions and how often.

use crate::cards::Card;
use crate::error::{CfrError, CfrResult};
use crate::game_tree::{Action, NodeId};
use crate::holdings::Hand;
use crate::solver::SolveContext;
use crate::street_values::ProbRule;
use crate::value_store::ValueStore;

pub struct StrategyResult {
    pub actions: Vec<Action>,
    pub frequencies: Vec<f64>,
}

impl StrategyResult {
    /// Action with the highest frequency; the first one on ties.
    pub fn best_action(&self) -> Option<Action> {
        let mut best: Option<(Action, f64)> = None;
        for (&a, &f) in self.actions.iter().zip(&self.frequencies) {
            if best.map_or(true, |(_, bf)| f > bf) {
                best = Some((a, f));
            }
        }
        best.map(|(a, _)| a)
    }
}

fn deck_board(ctx: &SolveContext, board: &[Card]) -> String {
    ctx.game.deck.format_cards(board)
}

pub struct StrategyReader<'a> {
    ctx: &'a SolveContext,
    sumprobs: &'a ValueStore,
}

impl<'a> StrategyReader<'a> {
    pub fn new(ctx: &'a SolveContext, sumprobs: &'a ValueStore) -> StrategyReader<'a> {
        StrategyReader { ctx, sumprobs }
    }

    /// Board index and holding rank of raw cards after canonicalization.
    pub fn locate(&self, street: usize, board: &[Card], hole: &[Card]) -> CfrResult<(usize, usize)> {
        let game = &self.ctx.game;
        let deck = &game.deck;
        let index = &*self.ctx.index;
        if board.len() != game.num_board_cards(street) {
            return Err(CfrError::InvalidCard(format!(
                "street {} needs {} board cards, got {}",
                street,
                game.num_board_cards(street),
                board.len()
            )));
        }
        if hole.len() != game.num_hole_cards {
            return Err(CfrError::InvalidCard(format!(
                "expected {} hole cards, got {}",
                game.num_hole_cards,
                hole.len()
            )));
        }
        let (canonical, perm) = index.boards.canonicalize(deck, board);
        let board_index = index
            .boards
            .find(deck, street, board)
            .ok_or_else(|| CfrError::InvalidCard(format!("unknown board {}", deck.format_cards(board))))?;
        let perm = &index.boards.perms[perm];
        let mut hand: Hand = [crate::cards::NO_CARD; 2];
        for (slot, &c) in hand.iter_mut().zip(hole) {
            *slot = deck.permute(c, perm);
        }
        let rank = index.hole_card_pair_rank(&canonical, &hand).ok_or_else(|| {
            CfrError::InvalidCard(format!(
                "hole cards {} overlap the board",
                deck.format_cards(hole)
            ))
        })?;
        Ok((board_index, rank))
    }

    /// Average strategy at `node` for `hole` on the raw `board`.
    pub fn strategy(&self, node: NodeId, board: &[Card], hole: &[Card]) -> CfrResult<StrategyResult> {
        let tree = &self.ctx.tree;
        if tree.is_terminal(node) {
            return Err(CfrError::Config(format!("node {} is terminal", node)));
        }
        let n = tree.node(node);
        let ns = n.succs.len();
        if ns == 1 {
            return Ok(StrategyResult {
                actions: n.actions.clone(),
                frequencies: vec![1.0],
            });
        }
        let street = n.street;
        let (board_index, rank) = self.locate(street, board, hole)?;
        let sv = self.sumprobs.streets.get(street).and_then(Option::as_ref).ok_or_else(|| {
            CfrError::Config(format!("no sumprobs for street {}", street))
        })?;
        if !sv.bucketed && !sv.segments.iter().flatten().any(|s| s.contains(board_index)) {
            return Err(CfrError::Config(format!(
                "board {} lies outside the solved subgame",
                deck_board(self.ctx, board)
            )));
        }
        let row = if sv.bucketed {
            let key = self.ctx.index.holding_key(street, board_index, rank);
            self.ctx.buckets.bucket(street, key)
        } else {
            sv.board_offset(board_index) + rank
        };
        let mut frequencies = vec![0.0; ns];
        sv.segment(board_index).probs(
            n.player,
            n.id as usize,
            &[row],
            ProbRule::Average,
            tree.default_successor_index(node),
            &mut frequencies,
        );
        Ok(StrategyResult {
            actions: n.actions.clone(),
            frequencies,
        })
    }
}
