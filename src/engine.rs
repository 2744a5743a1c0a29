//! Vectorized counterfactual value computation.
//!
//! One call to `Walk::run` computes, for every holding of the target player
//! on a board, its counterfactual value given the opponent's reach
//! probabilities. Only the opponent's reach is carried down the tree; values
//! for all of the target player's holdings come back up in one vector.
//!
//! Node handling:
//!   terminal          fold or showdown against the opponent reach
//!   street initial    recurse into every canonical child board, map values
//!                     back onto the parent board's holdings
//!   own choice        successor values mixed by the current strategy,
//!                     regrets updated
//!   opponent choice   reach split by the opponent's strategy, sumprobs
//!                     accumulated

use std::ops::Range;
use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::UpdateRule;
use crate::game_tree::NodeId;
use crate::holdings::{Hand, Showdown};
use crate::solver::SolveContext;
use crate::street_values::{Bounds, ProbRule};
use crate::terminal::{fold_values, showdown_values};
use crate::value_store::ValueStore;
use crate::worker_pool::WorkerPool;

/// Which store supplies action probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Regret matching on the regrets.
    Regrets,
    /// Normalized cumulative strategy.
    Sumprobs,
    /// Most likely action of the cumulative strategy.
    PureSumprobs,
}

#[derive(Debug, Clone)]
pub struct TraversalPolicy {
    pub source: ValueSource,
    pub update: UpdateRule,
    /// Per street: the target player takes the best successor instead of
    /// mixing.
    pub best_response: Vec<bool>,
}

impl TraversalPolicy {
    pub fn cfr(update: UpdateRule) -> TraversalPolicy {
        TraversalPolicy {
            source: ValueSource::Regrets,
            update,
            best_response: Vec::new(),
        }
    }

    /// Both players play their average strategy.
    pub fn average() -> TraversalPolicy {
        TraversalPolicy {
            source: ValueSource::Sumprobs,
            update: UpdateRule::None,
            best_response: Vec::new(),
        }
    }

    /// The target player best-responds on every street.
    pub fn best_response(num_streets: usize) -> TraversalPolicy {
        TraversalPolicy {
            source: ValueSource::Sumprobs,
            update: UpdateRule::None,
            best_response: vec![true; num_streets],
        }
    }

    #[inline]
    pub fn value_only(&self) -> bool {
        self.update == UpdateRule::None
    }

    #[inline]
    fn best_response_on(&self, street: usize) -> bool {
        self.best_response.get(street).copied().unwrap_or(false)
    }
}

/// Holdings of one board as seen by the walk.
pub struct Frame<'a> {
    pub street: usize,
    pub board: usize,
    pub hands: Vec<Hand>,
    /// Row of each holding within the store segment: an offset into the
    /// board's rows, or a bucket id.
    pub rows: Vec<usize>,
    pub showdown: Option<&'a Showdown>,
}

// ---------------------------------------------------------------------------
// Board jobs
// ---------------------------------------------------------------------------

/// Walk of one child board at the split street, run on a worker.
pub struct BoardJob {
    pub ctx: Arc<SolveContext>,
    pub policy: Arc<TraversalPolicy>,
    pub player: usize,
    pub iteration: u64,
    pub sumprob_weight: Option<f64>,
    pub node: NodeId,
    pub parent_street: usize,
    pub parent_board: usize,
    pub board: usize,
    pub reach: Arc<[f64]>,
    pub regrets: Option<ValueStore>,
    pub sumprobs: Option<ValueStore>,
}

pub struct BoardResult {
    /// Values over the parent board's holdings, summed over variants.
    pub contribution: Vec<f64>,
    pub regrets: Option<ValueStore>,
    pub sumprobs: Option<ValueStore>,
}

pub type BoardPool = WorkerPool<BoardJob, BoardResult>;

pub fn run_board_job(mut job: BoardJob) -> BoardResult {
    let ctx = &*job.ctx;
    let policy = &*job.policy;
    let contribution = {
        let mut walk = Walk::new(
            ctx,
            policy,
            job.player,
            job.iteration,
            job.sumprob_weight,
            job.regrets.as_mut(),
            job.sumprobs.as_mut(),
        );
        let parent = walk.frame(job.parent_street, job.parent_board);
        walk.enter_board(job.node, &parent, job.board, &job.reach)
    };
    BoardResult {
        contribution,
        regrets: job.regrets,
        sumprobs: job.sumprobs,
    }
}

/// What a driver walk needs to farm boards out.
#[derive(Clone, Copy)]
pub struct Dispatch<'a> {
    pub pool: &'a BoardPool,
    pub ctx: &'a Arc<SolveContext>,
    pub policy: &'a Arc<TraversalPolicy>,
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

pub struct Walk<'a> {
    ctx: &'a SolveContext,
    policy: &'a TraversalPolicy,
    player: usize,
    iteration: u64,
    sumprob_weight: Option<f64>,
    regrets: Option<&'a mut ValueStore>,
    sumprobs: Option<&'a mut ValueStore>,
    rng: StdRng,
    dispatch: Option<Dispatch<'a>>,
}

impl<'a> Walk<'a> {
    pub fn new(
        ctx: &'a SolveContext,
        policy: &'a TraversalPolicy,
        player: usize,
        iteration: u64,
        sumprob_weight: Option<f64>,
        regrets: Option<&'a mut ValueStore>,
        sumprobs: Option<&'a mut ValueStore>,
    ) -> Walk<'a> {
        Walk {
            ctx,
            policy,
            player,
            iteration,
            sumprob_weight,
            regrets,
            sumprobs,
            rng: StdRng::seed_from_u64(ctx.config.seed),
            dispatch: None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Option<Dispatch<'a>>) -> Walk<'a> {
        self.dispatch = dispatch;
        self
    }

    /// Values of the target player's holdings at `root` on `board`.
    pub fn run(&mut self, root: NodeId, street: usize, board: usize, opp_reach: &[f64]) -> Vec<f64> {
        let seed = board_seed(self.ctx.config.seed, self.iteration, self.player, root, street, board);
        self.rng = StdRng::seed_from_u64(seed);
        let frame = self.frame(street, board);
        assert_eq!(
            opp_reach.len(),
            frame.hands.len(),
            "reach vector does not match the board's holdings"
        );
        self.process(root, &frame, opp_reach)
    }

    pub fn frame(&self, street: usize, board: usize) -> Frame<'a> {
        let ctx = self.ctx;
        let index = &*ctx.index;
        let hands = index.hands(street, board);
        let n = hands.len();
        let rows = if ctx.buckets.is_bucketed(street) {
            (0..n)
                .map(|i| ctx.buckets.bucket(street, index.holding_key(street, board, i)))
                .collect()
        } else {
            let layout = self.regrets.as_deref().or(self.sumprobs.as_deref());
            match layout.and_then(|s| s.streets[street].as_ref()) {
                Some(sv) => {
                    let offset = sv.board_offset(board);
                    (offset..offset + n).collect()
                }
                None => Vec::new(),
            }
        };
        let showdown = if street == ctx.game.max_street() {
            Some(index.showdown(board))
        } else {
            None
        };
        Frame {
            street,
            board,
            hands,
            rows,
            showdown,
        }
    }

    pub fn process(&mut self, node: NodeId, frame: &Frame<'a>, reach: &[f64]) -> Vec<f64> {
        let tree = &self.ctx.tree;
        if tree.street(node) > frame.street {
            return self.street_initial(node, frame, reach);
        }
        if tree.is_terminal(node) {
            return self.terminal(node, frame, reach);
        }
        if tree.num_successors(node) == 1 {
            return self.process(tree.successor(node, 0), frame, reach);
        }
        if tree.player_acting(node) == self.player {
            self.our_choice(node, frame, reach)
        } else {
            self.opp_choice(node, frame, reach)
        }
    }

    fn terminal(&mut self, node: NodeId, frame: &Frame<'a>, reach: &[f64]) -> Vec<f64> {
        let ctx = self.ctx;
        let tree = &ctx.tree;
        let deck_size = ctx.game.deck.size();
        let last_bet_to = tree.last_bet_to(node) as f64;
        let mut out = vec![0.0; frame.hands.len()];
        if tree.remaining_players(node) == 1 {
            let amount = if tree.player_acting(node) == self.player {
                -last_bet_to
            } else {
                last_bet_to
            };
            fold_values(&frame.hands, reach, deck_size, amount, &mut out);
        } else {
            let showdown = match frame.showdown {
                Some(sd) => sd,
                None => panic!("showdown at node {} on street {}", node, frame.street),
            };
            showdown_values(&frame.hands, showdown, reach, deck_size, last_bet_to, &mut out);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Street transitions
    // -----------------------------------------------------------------------

    fn street_initial(&mut self, node: NodeId, frame: &Frame<'a>, reach: &[f64]) -> Vec<f64> {
        let ctx = self.ctx;
        let child_street = frame.street + 1;
        let boards = ctx
            .index
            .successor_board_range(frame.street, frame.board, child_street);
        let num_deals = ctx.game.num_deals(frame.street);
        let variants: usize = boards
            .clone()
            .map(|b| ctx.index.num_variants(child_street, b))
            .sum();
        assert!(
            num_deals > 0 && variants > 0,
            "street {} board {} has no deals",
            frame.street,
            frame.board
        );

        let mut total = vec![0.0; frame.hands.len()];
        match self.dispatch {
            Some(d) if ctx.split_street == Some(child_street) => {
                self.dispatch_boards(d, node, frame, boards, reach, &mut total);
            }
            _ => {
                for b in boards {
                    let contribution = self.enter_board(node, frame, b, reach);
                    for (t, c) in total.iter_mut().zip(&contribution) {
                        *t += c;
                    }
                }
            }
        }
        let scale = 1.0 / num_deals as f64;
        for t in total.iter_mut() {
            *t *= scale;
        }
        total
    }

    /// Walks `node` on child board `board` and returns its values summed over
    /// every raw deal the board stands for, indexed by parent holding.
    pub fn enter_board(&mut self, node: NodeId, parent: &Frame<'a>, board: usize, reach: &[f64]) -> Vec<f64> {
        let ctx = self.ctx;
        let index = &*ctx.index;
        let deck = &ctx.game.deck;
        let child_street = parent.street + 1;
        let parent_cards = index.canonical_board(parent.street, parent.board);
        let child_cards = index.canonical_board(child_street, board);

        let child = self.frame(child_street, board);
        let child_reach: Vec<f64> = child
            .hands
            .iter()
            .map(|h| index.hole_card_pair_rank(parent_cards, h).map_or(0.0, |r| reach[r]))
            .collect();

        let seed = board_seed(ctx.config.seed, self.iteration, self.player, node, child_street, board);
        let saved = std::mem::replace(&mut self.rng, StdRng::seed_from_u64(seed));
        let values = self.process(node, &child, &child_reach);
        self.rng = saved;

        let mut out = vec![0.0; parent.hands.len()];
        for perm in index.boards.variant_perms(child_street, board) {
            for (h, hand) in parent.hands.iter().enumerate() {
                let mapped = [deck.permute(hand[0], perm), deck.permute(hand[1], perm)];
                if let Some(r) = index.hole_card_pair_rank(child_cards, &mapped) {
                    out[h] += values[r];
                }
            }
        }
        out
    }

    fn dispatch_boards(
        &mut self,
        d: Dispatch<'a>,
        node: NodeId,
        frame: &Frame<'a>,
        boards: Range<usize>,
        reach: &[f64],
        total: &mut [f64],
    ) {
        let index = &*self.ctx.index;
        let child_street = frame.street + 1;
        let shared: Arc<[f64]> = Arc::from(reach);
        debug!(
            "dispatching {} boards of street {} at node {}",
            boards.len(),
            child_street,
            node
        );
        let jobs: Vec<BoardJob> = boards
            .map(|b| BoardJob {
                ctx: Arc::clone(d.ctx),
                policy: Arc::clone(d.policy),
                player: self.player,
                iteration: self.iteration,
                sumprob_weight: self.sumprob_weight,
                node,
                parent_street: frame.street,
                parent_board: frame.board,
                board: b,
                reach: Arc::clone(&shared),
                regrets: self
                    .regrets
                    .as_deref_mut()
                    .map(|s| s.take_shard(index, child_street, b)),
                sumprobs: self
                    .sumprobs
                    .as_deref_mut()
                    .map(|s| s.take_shard(index, child_street, b)),
            })
            .collect();

        for result in d.pool.run_batch(jobs) {
            if let (Some(store), Some(shard)) = (self.regrets.as_deref_mut(), result.regrets) {
                store.restore_shard(index, shard);
            }
            if let (Some(store), Some(shard)) = (self.sumprobs.as_deref_mut(), result.sumprobs) {
                store.restore_shard(index, shard);
            }
            for (t, c) in total.iter_mut().zip(&result.contribution) {
                *t += c;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Choice nodes
    // -----------------------------------------------------------------------

    fn probs(&self, player: usize, node: NodeId, frame: &Frame<'a>, out: &mut [f64]) {
        let tree = &self.ctx.tree;
        let (store, rule) = match self.policy.source {
            ValueSource::Regrets => (self.regrets.as_deref(), ProbRule::RegretMatch),
            ValueSource::Sumprobs => (self.sumprobs.as_deref(), ProbRule::Average),
            ValueSource::PureSumprobs => (self.sumprobs.as_deref(), ProbRule::Pure),
        };
        let Some(store) = store else {
            panic!("walk has no store for {:?}", self.policy.source);
        };
        store.street(frame.street).segment(frame.board).probs(
            player,
            tree.nonterminal_id(node),
            &frame.rows,
            rule,
            tree.default_successor_index(node),
            out,
        );
    }

    fn our_choice(&mut self, node: NodeId, frame: &Frame<'a>, reach: &[f64]) -> Vec<f64> {
        let ctx = self.ctx;
        let tree = &ctx.tree;
        let ns = tree.num_successors(node);
        let n = frame.hands.len();
        let succ_vals: Vec<Vec<f64>> = (0..ns)
            .map(|s| self.process(tree.successor(node, s), frame, reach))
            .collect();

        if self.policy.best_response_on(frame.street) {
            return (0..n)
                .map(|h| succ_vals.iter().map(|v| v[h]).fold(f64::NEG_INFINITY, f64::max))
                .collect();
        }

        let mut probs = vec![0.0; n * ns];
        self.probs(self.player, node, frame, &mut probs);
        let mut vals = vec![0.0; n];
        for (h, v) in vals.iter_mut().enumerate() {
            for (s, sv) in succ_vals.iter().enumerate() {
                *v += probs[h * ns + s] * sv[h];
            }
        }

        if !self.policy.value_only() {
            let sc = ctx.config.street(frame.street);
            let mut deltas = vec![0.0; n * ns];
            for h in 0..n {
                for (s, sv) in succ_vals.iter().enumerate() {
                    deltas[h * ns + s] = (sv[h] - vals[h]) * sc.regret_scaling;
                }
            }
            let bounds = Bounds {
                floor: ctx.config.regret_floor(frame.street),
                ceiling: sc.regret_ceiling,
            };
            let Some(regrets) = self.regrets.as_deref_mut() else {
                panic!("regret update without a regret store");
            };
            regrets.street_mut(frame.street).segment_mut(frame.board).add(
                self.player,
                tree.nonterminal_id(node),
                &frame.rows,
                &deltas,
                bounds,
                &mut self.rng,
            );
        }
        vals
    }

    fn opp_choice(&mut self, node: NodeId, frame: &Frame<'a>, reach: &[f64]) -> Vec<f64> {
        let ctx = self.ctx;
        let tree = &ctx.tree;
        let opp = 1 - self.player;
        let ns = tree.num_successors(node);
        let n = frame.hands.len();

        let mut probs = vec![0.0; n * ns];
        self.probs(opp, node, frame, &mut probs);

        if !self.policy.value_only() {
            self.accumulate(opp, node, frame, reach, &probs);
        }

        let succ_reach = split_reach(reach, &probs, ns);
        let mut vals = vec![0.0; n];
        for (s, r) in succ_reach.iter().enumerate() {
            if !self.policy.value_only() && r.iter().all(|&x| x == 0.0) {
                continue;
            }
            let v = self.process(tree.successor(node, s), frame, r);
            for (a, b) in vals.iter_mut().zip(&v) {
                *a += b;
            }
        }
        vals
    }

    fn accumulate(&mut self, opp: usize, node: NodeId, frame: &Frame<'a>, reach: &[f64], probs: &[f64]) {
        let Some(weight) = self.sumprob_weight else {
            return;
        };
        let ctx = self.ctx;
        let sc = ctx.config.street(frame.street);
        if !sc.accumulate_sumprobs {
            return;
        }
        let Some(sumprobs) = self.sumprobs.as_deref_mut() else {
            return;
        };
        if !sumprobs.players[opp] {
            return;
        }
        let ns = ctx.tree.num_successors(node);
        let scale = weight * sc.sumprob_scaling;
        let incr: Vec<f64> = probs
            .iter()
            .enumerate()
            .map(|(i, &p)| reach[i / ns] * p * scale)
            .collect();
        let bounds = Bounds {
            floor: None,
            ceiling: sc.sumprob_ceiling,
        };
        sumprobs.street_mut(frame.street).segment_mut(frame.board).add(
            opp,
            ctx.tree.nonterminal_id(node),
            &frame.rows,
            &incr,
            bounds,
            &mut self.rng,
        );
    }
}

/// Reach of each successor: the incoming reach times the probability of
/// taking it. `probs` is holding-major with `ns` successors per holding.
pub fn split_reach(reach: &[f64], probs: &[f64], ns: usize) -> Vec<Vec<f64>> {
    (0..ns)
        .map(|s| {
            reach
                .iter()
                .enumerate()
                .map(|(h, &r)| r * probs[h * ns + s])
                .collect()
        })
        .collect()
}

fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for the walk of one board, independent of which thread runs it.
pub fn board_seed(seed: u64, iteration: u64, player: usize, node: NodeId, street: usize, board: usize) -> u64 {
    [iteration, player as u64, node as u64, street as u64, board as u64]
        .into_iter()
        .fold(splitmix(seed), |h, v| splitmix(h ^ v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reach_conserves_mass() {
        let reach = [0.5, 1.0, 0.0, 0.25];
        let probs = [0.2, 0.8, 1.0, 0.0, 0.5, 0.5, 0.1, 0.9];
        let succ = split_reach(&reach, &probs, 2);
        for h in 0..4 {
            let sum = succ[0][h] + succ[1][h];
            assert!((sum - reach[h]).abs() < 1e-15);
        }
    }

    #[test]
    fn seeds_differ_by_board() {
        assert_ne!(board_seed(1, 2, 0, 5, 1, 0), board_seed(1, 2, 0, 5, 1, 1));
        assert_eq!(board_seed(1, 2, 0, 5, 1, 0), board_seed(1, 2, 0, 5, 1, 0));
    }
}
