//! Limit betting tree construction.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CfrError, CfrResult};
use crate::game::GameDef;
use crate::game_tree::{Action, GameTree, Node, NodeId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingConfig {
    /// Posted by each player before the deal.
    pub ante: u32,
    /// Blind posted by each player on the first street; empty for none.
    pub blinds: Vec<u32>,
    /// Fixed bet size per street.
    pub bet_sizes: Vec<u32>,
    /// Cap on bets plus raises per street, counting a posted blind.
    pub max_bets: Vec<u32>,
    /// Player who opens the action on each street.
    pub first_to_act: Vec<usize>,
    /// Total chips a player may commit, ante included.
    pub stack: Option<u32>,
    /// Share street-initial nodes reached with equal commitments.
    pub reentrant: bool,
}

impl Default for BettingConfig {
    fn default() -> Self {
        BettingConfig::kuhn()
    }
}

impl BettingConfig {
    pub fn kuhn() -> BettingConfig {
        BettingConfig {
            ante: 1,
            blinds: Vec::new(),
            bet_sizes: vec![1],
            max_bets: vec![1],
            first_to_act: vec![0],
            stack: None,
            reentrant: false,
        }
    }

    pub fn leduc() -> BettingConfig {
        BettingConfig {
            ante: 1,
            blinds: Vec::new(),
            bet_sizes: vec![2, 4],
            max_bets: vec![2, 2],
            first_to_act: vec![0, 0],
            stack: None,
            reentrant: false,
        }
    }

    pub fn validate(&self, game: &GameDef) -> CfrResult<()> {
        let n = game.num_streets();
        if self.bet_sizes.len() != n || self.max_bets.len() != n || self.first_to_act.len() != n {
            return Err(CfrError::Config(format!(
                "betting needs bet_sizes, max_bets and first_to_act for {} streets",
                n
            )));
        }
        if !self.blinds.is_empty() && self.blinds.len() != 2 {
            return Err(CfrError::Config("blinds must list one amount per player".to_string()));
        }
        if self.first_to_act.iter().any(|&p| p > 1) {
            return Err(CfrError::Config("first_to_act must be 0 or 1".to_string()));
        }
        if self.ante == 0 && self.blinds.iter().all(|&b| b == 0) {
            return Err(CfrError::Config("pot starts empty".to_string()));
        }
        if let Some(stack) = self.stack {
            let posted = self.ante + self.blinds.iter().copied().max().unwrap_or(0);
            if stack < posted {
                return Err(CfrError::Config(format!(
                    "stack {} smaller than the forced bets {}",
                    stack, posted
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    street: usize,
    committed: [u32; 2],
    to_act: usize,
    num_bets: u32,
    actions_on_street: u32,
}

struct Builder<'a> {
    game: &'a GameDef,
    betting: &'a BettingConfig,
    nodes: Vec<Node>,
    next_id: Vec<Vec<u32>>,
    street_starts: HashMap<(usize, u32), NodeId>,
}

impl<'a> Builder<'a> {
    fn alloc(&mut self, street: usize, player: usize, terminal: bool) -> NodeId {
        let slot = if terminal { 2 } else { player };
        let id = self.next_id[slot][street];
        self.next_id[slot][street] += 1;
        self.nodes.push(Node {
            street,
            player,
            id,
            succs: Vec::new(),
            actions: Vec::new(),
            fold_succ: None,
            call_succ: None,
            last_bet_to: 0,
            terminal,
            remaining_players: 2,
        });
        (self.nodes.len() - 1) as NodeId
    }

    fn cap(&self) -> u32 {
        self.betting.stack.unwrap_or(u32::MAX)
    }

    fn all_in(&self, state: &State) -> bool {
        state.committed.iter().any(|&c| c >= self.cap())
    }

    fn fold(&mut self, state: &State) -> NodeId {
        let folder = state.to_act;
        let n = self.alloc(state.street, folder, true);
        let node = &mut self.nodes[n as usize];
        node.last_bet_to = state.committed[folder];
        node.remaining_players = 1;
        n
    }

    fn showdown(&mut self, state: &State) -> NodeId {
        let n = self.alloc(state.street, state.to_act, true);
        self.nodes[n as usize].last_bet_to = state.committed[0];
        n
    }

    /// Node reached once betting on `state.street` closes.
    fn close_street(&mut self, state: &State) -> NodeId {
        if state.street == self.game.max_street() {
            return self.showdown(state);
        }
        let street = state.street + 1;
        let next = State {
            street,
            committed: state.committed,
            to_act: self.betting.first_to_act[street],
            num_bets: 0,
            actions_on_street: 0,
        };
        if self.betting.reentrant {
            let key = (street, state.committed[0]);
            if let Some(&n) = self.street_starts.get(&key) {
                return n;
            }
            let n = self.decision(&next);
            self.street_starts.insert(key, n);
            return n;
        }
        self.decision(&next)
    }

    fn decision(&mut self, state: &State) -> NodeId {
        let actor = state.to_act;
        let opp = 1 - actor;
        let n = self.alloc(state.street, actor, false);
        self.nodes[n as usize].last_bet_to = state.committed[actor];

        let mut succs = Vec::new();
        let mut actions = Vec::new();
        let mut fold_succ = None;

        if self.all_in(state) && state.committed[0] == state.committed[1] {
            // No betting left; walk to the next street.
            succs.push(self.close_street(state));
            actions.push(Action::Check);
        } else {
            let to_call = state.committed[opp] - state.committed[actor];
            let mut after = *state;
            after.actions_on_street += 1;
            after.to_act = opp;

            if to_call == 0 {
                let closes = state.actions_on_street > 0;
                let s = if closes {
                    self.close_street(&after)
                } else {
                    self.decision(&after)
                };
                succs.push(s);
                actions.push(Action::Check);
            } else {
                let mut called = after;
                called.committed[actor] = state.committed[opp];
                // A limp into the big blind leaves the blind an option.
                let limp = state.street == 0
                    && !self.betting.blinds.is_empty()
                    && state.num_bets == 1
                    && state.actions_on_street == 0;
                let s = if limp {
                    self.decision(&called)
                } else {
                    self.close_street(&called)
                };
                succs.push(s);
                actions.push(Action::Call);

                fold_succ = Some(succs.len());
                succs.push(self.fold(state));
                actions.push(Action::Fold);
            }

            let can_raise = state.num_bets < self.betting.max_bets[state.street]
                && state.committed[opp] < self.cap();
            if can_raise {
                let size = self.betting.bet_sizes[state.street];
                let to = (state.committed[opp] + size).min(self.cap());
                let mut bet = after;
                bet.committed[actor] = to;
                bet.num_bets += 1;
                succs.push(self.decision(&bet));
                actions.push(if to_call == 0 {
                    Action::Bet(to)
                } else {
                    Action::Raise(to)
                });
            }
        }

        let node = &mut self.nodes[n as usize];
        node.succs = succs;
        node.actions = actions;
        node.fold_succ = fold_succ;
        node.call_succ = Some(0);
        n
    }
}

/// Builds the betting tree for `game` under `betting`.
pub fn build_tree(game: &GameDef, betting: &BettingConfig) -> CfrResult<GameTree> {
    betting.validate(game)?;
    let mut committed = [betting.ante; 2];
    let mut num_bets = 0;
    if !betting.blinds.is_empty() {
        for p in 0..2 {
            committed[p] += betting.blinds[p];
        }
        if betting.blinds[0] != betting.blinds[1] {
            num_bets = 1;
        }
    }
    let mut builder = Builder {
        game,
        betting,
        nodes: Vec::new(),
        next_id: vec![vec![0; game.num_streets()]; 3],
        street_starts: HashMap::new(),
    };
    let root = builder.decision(&State {
        street: 0,
        committed,
        to_act: betting.first_to_act[0],
        num_bets,
        actions_on_street: 0,
    });
    let tree = GameTree::from_nodes(builder.nodes, root, game.num_streets());
    tree.validate()?;
    debug!(
        "{}: {} tree nodes (reentrant: {})",
        game.name,
        tree.len(),
        betting.reentrant
    );
    Ok(tree)
}
