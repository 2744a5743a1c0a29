//! Betting tree stored as an arena.
//!
//! Nodes live in one `Vec` and refer to their successors by `NodeId`. A node
//! reachable along several action paths (a reentrant tree) is stored once and
//! listed as a successor by every parent. Nonterminals carry an id that is
//! dense per (acting player, street); storage rows are addressed by that id.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CfrError, CfrResult};

pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Check,
    Call,
    Fold,
    Bet(u32),
    Raise(u32),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Check => write!(f, "Check"),
            Action::Call => write!(f, "Call"),
            Action::Fold => write!(f, "Fold"),
            Action::Bet(to) => write!(f, "Bet {}", to),
            Action::Raise(to) => write!(f, "Raise {}", to),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub street: usize,
    /// Acting player; for a fold terminal, the player who folded.
    pub player: usize,
    /// Dense id per (player, street) for nonterminals, per street for
    /// terminals.
    pub id: u32,
    pub succs: Vec<NodeId>,
    pub actions: Vec<Action>,
    pub fold_succ: Option<usize>,
    pub call_succ: Option<usize>,
    /// Chips committed by each player still in the hand; for a fold
    /// terminal, chips committed by the folder.
    pub last_bet_to: u32,
    pub terminal: bool,
    pub remaining_players: usize,
}

#[derive(Debug, Clone)]
pub struct GameTree {
    nodes: Vec<Node>,
    root: NodeId,
    num_streets: usize,
    /// `[player][street]`
    num_nonterminals: Vec<Vec<usize>>,
}

impl GameTree {
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId, num_streets: usize) -> GameTree {
        let mut num_nonterminals = vec![vec![0usize; num_streets]; 2];
        for node in nodes.iter().filter(|n| !n.terminal) {
            if node.player < 2 && node.street < num_streets {
                let count = &mut num_nonterminals[node.player][node.street];
                *count = (*count).max(node.id as usize + 1);
            }
        }
        GameTree {
            nodes,
            root,
            num_streets,
            num_nonterminals,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, n: NodeId) -> &Node {
        &self.nodes[n as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn num_players(&self) -> usize {
        2
    }

    #[inline]
    pub fn num_streets(&self) -> usize {
        self.num_streets
    }

    pub fn num_nonterminals(&self, player: usize, street: usize) -> usize {
        self.num_nonterminals[player][street]
    }

    // -----------------------------------------------------------------------
    // Node queries
    // -----------------------------------------------------------------------

    #[inline]
    pub fn street(&self, n: NodeId) -> usize {
        self.node(n).street
    }

    #[inline]
    pub fn player_acting(&self, n: NodeId) -> usize {
        self.node(n).player
    }

    #[inline]
    pub fn nonterminal_id(&self, n: NodeId) -> usize {
        self.node(n).id as usize
    }

    #[inline]
    pub fn num_successors(&self, n: NodeId) -> usize {
        self.node(n).succs.len()
    }

    #[inline]
    pub fn successor(&self, n: NodeId, i: usize) -> NodeId {
        self.node(n).succs[i]
    }

    #[inline]
    pub fn fold_successor_index(&self, n: NodeId) -> Option<usize> {
        self.node(n).fold_succ
    }

    #[inline]
    pub fn call_successor_index(&self, n: NodeId) -> Option<usize> {
        self.node(n).call_succ
    }

    /// Successor played when regret matching has no positive regret.
    #[inline]
    pub fn default_successor_index(&self, n: NodeId) -> usize {
        self.node(n).call_succ.unwrap_or(0)
    }

    #[inline]
    pub fn last_bet_to(&self, n: NodeId) -> u32 {
        self.node(n).last_bet_to
    }

    #[inline]
    pub fn is_terminal(&self, n: NodeId) -> bool {
        self.node(n).terminal
    }

    #[inline]
    pub fn remaining_players(&self, n: NodeId) -> usize {
        self.node(n).remaining_players
    }

    pub fn action(&self, n: NodeId, i: usize) -> Action {
        self.node(n).actions[i]
    }

    // -----------------------------------------------------------------------
    // Walks
    // -----------------------------------------------------------------------

    /// Distinct nodes reachable from `from`, each listed at its first
    /// pre-order visit.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            order.push(n);
            for &s in self.node(n).succs.iter().rev() {
                if !seen.contains(&s) {
                    stack.push(s);
                }
            }
        }
        order
    }

    /// Nonterminals with a stored decision (more than one successor) for
    /// `player` on `street`, in pre-order from the root.
    pub fn decision_nodes(&self, player: usize, street: usize) -> Vec<NodeId> {
        self.preorder(self.root)
            .into_iter()
            .filter(|&n| {
                let node = self.node(n);
                !node.terminal
                    && node.player == player
                    && node.street == street
                    && node.succs.len() > 1
            })
            .collect()
    }

    /// A standalone copy of the tree below `from`, with ids reassigned
    /// densely in pre-order.
    pub fn subtree(&self, from: NodeId) -> GameTree {
        let order = self.preorder(from);
        let mut remap = vec![u32::MAX; self.nodes.len()];
        for (i, &n) in order.iter().enumerate() {
            remap[n as usize] = i as NodeId;
        }
        let mut next_id = vec![vec![0u32; self.num_streets]; 3];
        let mut nodes = Vec::with_capacity(order.len());
        for &n in &order {
            let old = self.node(n);
            let slot = if old.terminal { 2 } else { old.player };
            let id = next_id[slot][old.street];
            next_id[slot][old.street] += 1;
            nodes.push(Node {
                id,
                succs: old.succs.iter().map(|&s| remap[s as usize]).collect(),
                ..old.clone()
            });
        }
        GameTree::from_nodes(nodes, 0, self.num_streets)
    }

    /// First node reached by following `actions` from the root.
    pub fn find_line(&self, actions: &[Action]) -> Option<NodeId> {
        let mut n = self.root;
        for a in actions {
            let i = self.node(n).actions.iter().position(|x| x == a)?;
            n = self.successor(n, i);
        }
        Some(n)
    }

    pub fn validate(&self) -> CfrResult<()> {
        let last = self.num_streets - 1;
        for n in self.preorder(self.root) {
            let node = self.node(n);
            if node.street > last {
                return Err(CfrError::InvalidGame(format!("node {} on street {}", n, node.street)));
            }
            if node.terminal {
                match node.remaining_players {
                    1 => {}
                    2 if node.street == last => {}
                    2 => {
                        return Err(CfrError::InvalidGame(format!(
                            "showdown node {} before the final street",
                            n
                        )))
                    }
                    k => {
                        return Err(CfrError::InvalidGame(format!(
                            "terminal {} has {} players; only two-player trees are supported",
                            n, k
                        )))
                    }
                }
                continue;
            }
            if node.player >= 2 {
                return Err(CfrError::InvalidGame(format!(
                    "node {} acted on by player {}",
                    n, node.player
                )));
            }
            if node.succs.is_empty() {
                return Err(CfrError::InvalidGame(format!("nonterminal {} has no successors", n)));
            }
            if node.actions.len() != node.succs.len() {
                return Err(CfrError::InvalidGame(format!("node {} action labels out of sync", n)));
            }
            for &s in &node.succs {
                let street = self.street(s);
                if street != node.street && street != node.street + 1 {
                    return Err(CfrError::InvalidGame(format!(
                        "node {} jumps from street {} to {}",
                        n, node.street, street
                    )));
                }
            }
            if let Some(f) = node.fold_succ {
                let s = self.successor(n, f);
                if !self.is_terminal(s) || self.remaining_players(s) != 1 {
                    return Err(CfrError::InvalidGame(format!(
                        "fold successor of {} is not a fold terminal",
                        n
                    )));
                }
            }
        }
        Ok(())
    }
}
