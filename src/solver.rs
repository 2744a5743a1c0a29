//! Iteration driver: owns the stores and the worker pool and runs
//! alternating half-iterations of the traversal.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::buckets::Buckets;
use crate::config::SolverConfig;
use crate::engine::{run_board_job, BoardPool, Dispatch, TraversalPolicy, Walk};
use crate::error::{CfrError, CfrResult};
use crate::game::{GameDef, GameSpec};
use crate::game_tree::{GameTree, NodeId};
use crate::holdings::HoldingIndex;
use crate::terminal::disjoint_mass;
use crate::tree_builder::build_tree;
use crate::value_store::{StoreKind, StoreShape, ValueStore};
use crate::worker_pool::WorkerPool;

/// Read-only state shared by every walk and worker.
pub struct SolveContext {
    pub game: GameDef,
    pub tree: GameTree,
    pub index: Arc<HoldingIndex>,
    pub buckets: Arc<Buckets>,
    pub config: SolverConfig,
    pub root_street: usize,
    pub root_board: usize,
    pub split_street: Option<usize>,
}

impl SolveContext {
    pub fn new(
        tree: GameTree,
        index: Arc<HoldingIndex>,
        buckets: Arc<Buckets>,
        config: SolverConfig,
        root_street: usize,
        root_board: usize,
    ) -> CfrResult<SolveContext> {
        let game = index.game.clone();
        game.validate()?;
        tree.validate()?;
        config.validate(&game)?;
        if tree.num_streets() != game.num_streets() {
            return Err(CfrError::InvalidGame(format!(
                "tree has {} streets, game has {}",
                tree.num_streets(),
                game.num_streets()
            )));
        }
        if root_board >= index.num_boards(root_street) {
            return Err(CfrError::Config(format!(
                "street {} has no board {}",
                root_street, root_board
            )));
        }
        let split_street = config.split_street(
            &game,
            |s| {
                if s < root_street {
                    1
                } else {
                    index.successor_board_range(root_street, root_board, s).len()
                }
            },
            &buckets,
        )?;
        Ok(SolveContext {
            game,
            tree,
            index,
            buckets,
            config,
            root_street,
            root_board,
            split_street,
        })
    }

    fn shape(&self) -> StoreShape<'_> {
        StoreShape {
            tree: &self.tree,
            index: &self.index,
            buckets: &self.buckets,
            root_street: self.root_street,
            root_board: self.root_board,
            split_street: self.split_street,
        }
    }

    pub fn num_root_hands(&self) -> usize {
        self.index.num_hole_card_pairs(self.root_street)
    }
}

pub struct Solver {
    ctx: Arc<SolveContext>,
    regrets: ValueStore,
    sumprobs: ValueStore,
    pool: Option<BoardPool>,
    /// Reach of each player's holdings at the root.
    root_reach: [Vec<f64>; 2],
    /// Node of the parent tree this solver's root stands for.
    origin: Option<NodeId>,
    iteration: u64,
}

impl Solver {
    /// Full-game solver for a game spec without card abstraction.
    pub fn new(spec: &GameSpec, config: SolverConfig) -> CfrResult<Solver> {
        spec.betting.validate(&spec.game)?;
        let tree = build_tree(&spec.game, &spec.betting)?;
        let index = Arc::new(HoldingIndex::new(&spec.game));
        let buckets = Arc::new(Buckets::none(spec.game.num_streets()));
        Solver::from_parts(tree, index, buckets, config)
    }

    pub fn from_parts(
        tree: GameTree,
        index: Arc<HoldingIndex>,
        buckets: Arc<Buckets>,
        config: SolverConfig,
    ) -> CfrResult<Solver> {
        let ctx = SolveContext::new(tree, index, buckets, config, 0, 0)?;
        let n = ctx.num_root_hands();
        Ok(Solver::with_context(ctx, [vec![1.0; n], vec![1.0; n]], None))
    }

    fn with_context(ctx: SolveContext, root_reach: [Vec<f64>; 2], origin: Option<NodeId>) -> Solver {
        let num_streets = ctx.game.num_streets();
        let shape = ctx.shape();
        let regrets = ValueStore::allocate_and_clear(
            StoreKind::Regrets,
            shape,
            &ctx.config.regret_widths(num_streets),
            [true, true],
        );
        let sumprobs = ValueStore::allocate_and_clear(
            StoreKind::Sumprobs,
            shape,
            &ctx.config.sumprob_widths(num_streets),
            [true, true],
        );
        let pool = match ctx.split_street {
            Some(_) if ctx.config.threads > 1 => Some(WorkerPool::new(
                ctx.config.threads,
                ctx.config.queue_capacity,
                run_board_job,
            )),
            _ => None,
        };
        info!(
            "{}: {} nodes, split street {:?}, {} threads, {} bytes of regrets",
            ctx.game.name,
            ctx.tree.len(),
            ctx.split_street,
            pool.as_ref().map_or(1, |p| p.num_threads()),
            regrets.memory_bytes()
        );
        Solver {
            ctx: Arc::new(ctx),
            regrets,
            sumprobs,
            pool,
            root_reach,
            origin,
            iteration: 0,
        }
    }

    /// Solver for the subgame below `node` on `board`, with each player's
    /// reach at that point supplied by the caller.
    pub fn for_subgame(&self, node: NodeId, board: usize, root_reach: [Vec<f64>; 2]) -> CfrResult<Solver> {
        let ctx = &self.ctx;
        let street = ctx.tree.street(node);
        if street < ctx.root_street {
            return Err(CfrError::Config(format!(
                "subgame street {} precedes the solver root street {}",
                street, ctx.root_street
            )));
        }
        let n = ctx.index.num_hole_card_pairs(street);
        if root_reach.iter().any(|r| r.len() != n) {
            return Err(CfrError::Config(format!(
                "subgame reach vectors must have {} entries",
                n
            )));
        }
        let sub = SolveContext::new(
            ctx.tree.subtree(node),
            Arc::clone(&ctx.index),
            Arc::clone(&ctx.buckets),
            ctx.config.clone(),
            street,
            board,
        )?;
        Ok(Solver::with_context(sub, root_reach, Some(node)))
    }

    pub fn context(&self) -> &SolveContext {
        &self.ctx
    }

    pub fn regrets(&self) -> &ValueStore {
        &self.regrets
    }

    pub fn sumprobs(&self) -> &ValueStore {
        &self.sumprobs
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Runs `iterations` full iterations, each a half-iteration per player.
    pub fn run(&mut self, iterations: u64) -> CfrResult<()> {
        let start = Instant::now();
        let root = self.ctx.tree.root();
        let policy = TraversalPolicy::cfr(self.ctx.config.update);
        info!(
            "running {} iterations from iteration {}",
            iterations, self.iteration
        );
        for _ in 0..iterations {
            self.iteration += 1;
            for p in 0..2 {
                let opp_reach = self.root_reach[1 - p].clone();
                self.run_half_iteration(p, root, self.ctx.root_board, &opp_reach, policy.clone());
            }
            let log_every = self.ctx.config.log_every;
            if log_every > 0 && self.iteration % log_every == 0 {
                debug!(
                    "iteration {} ({:.1}s)",
                    self.iteration,
                    start.elapsed().as_secs_f64()
                );
            }
            self.maybe_checkpoint()?;
        }
        info!(
            "finished iteration {} in {:.2}s",
            self.iteration,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// One traversal for `player` from `root` on `board`. Returns the
    /// counterfactual value of each of the player's holdings.
    pub fn run_half_iteration(
        &mut self,
        player: usize,
        root: NodeId,
        board: usize,
        opp_reach: &[f64],
        policy: TraversalPolicy,
    ) -> Vec<f64> {
        let policy = Arc::new(policy);
        let weight = if policy.value_only() {
            None
        } else {
            self.ctx.config.warmup.weight(self.iteration)
        };
        let street = self.ctx.tree.street(root);
        let dispatch = self.pool.as_ref().map(|pool| Dispatch {
            pool,
            ctx: &self.ctx,
            policy: &policy,
        });
        let mut walk = Walk::new(
            &self.ctx,
            &policy,
            player,
            self.iteration,
            weight,
            Some(&mut self.regrets),
            Some(&mut self.sumprobs),
        )
        .with_dispatch(dispatch);
        walk.run(root, street, board, opp_reach)
    }

    /// Expected value per deal for `player` under `policy`.
    pub fn expected_value(&mut self, player: usize, policy: TraversalPolicy) -> f64 {
        let ctx = Arc::clone(&self.ctx);
        let own = self.root_reach[player].clone();
        let opp = self.root_reach[1 - player].clone();
        let values = self.run_half_iteration(player, ctx.tree.root(), ctx.root_board, &opp, policy);

        let hands = ctx.index.hands(ctx.root_street, ctx.root_board);
        let mut mass = vec![0.0; hands.len()];
        disjoint_mass(&hands, &opp, ctx.game.deck.size(), &mut mass);
        let num: f64 = own.iter().zip(&values).map(|(r, v)| r * v).sum();
        let den: f64 = own.iter().zip(&mass).map(|(r, m)| r * m).sum();
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }

    /// Player 0's value when both players follow their average strategy.
    pub fn game_value(&mut self) -> f64 {
        self.expected_value(0, TraversalPolicy::average())
    }

    pub fn best_response_value(&mut self, player: usize) -> f64 {
        let streets = self.ctx.game.num_streets();
        self.expected_value(player, TraversalPolicy::best_response(streets))
    }

    /// Mean of the two best-response values; zero at an equilibrium.
    pub fn exploitability(&mut self) -> f64 {
        let br0 = self.best_response_value(0);
        let br1 = self.best_response_value(1);
        debug!("best responses {:.6} {:.6}", br0, br1);
        (br0 + br1) / 2.0
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self, dir: &Path) -> CfrResult<()> {
        self.regrets.write(dir, self.iteration, &self.ctx.tree, None)?;
        self.sumprobs.write(dir, self.iteration, &self.ctx.tree, None)
    }

    pub fn load(&mut self, dir: &Path, iteration: u64) -> CfrResult<()> {
        self.regrets.read(dir, iteration, &self.ctx.tree, None)?;
        self.sumprobs.read(dir, iteration, &self.ctx.tree, None)?;
        self.iteration = iteration;
        info!("resumed from iteration {} in {}", iteration, dir.display());
        Ok(())
    }

    /// Sumprobs only, for callers that just read the strategy.
    pub fn load_sumprobs(&mut self, dir: &Path, iteration: u64) -> CfrResult<()> {
        self.sumprobs.read(dir, iteration, &self.ctx.tree, None)?;
        self.iteration = iteration;
        Ok(())
    }

    fn maybe_checkpoint(&self) -> CfrResult<()> {
        let config = &self.ctx.config;
        let (Some(every), Some(dir)) = (config.checkpoint_every, config.checkpoint_dir.as_ref()) else {
            return Ok(());
        };
        if every > 0 && self.iteration % every == 0 {
            info!("checkpoint at iteration {}", self.iteration);
            self.save(dir)?;
        }
        Ok(())
    }

    /// Writes this subgame's regrets and sumprobs into `parent`.
    pub fn merge_into(&self, parent: &mut Solver) -> CfrResult<()> {
        let Some(node) = self.origin else {
            return Err(CfrError::Config("solver is not a subgame".to_string()));
        };
        let index = &self.ctx.index;
        self.regrets
            .merge_into(&mut parent.regrets, &parent.ctx.tree, node, &self.ctx.tree, index)?;
        self.sumprobs
            .merge_into(&mut parent.sumprobs, &parent.ctx.tree, node, &self.ctx.tree, index)
    }
}
