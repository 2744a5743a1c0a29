//! Regrets or cumulative strategy for every street of a (sub)game.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::buckets::Buckets;
use crate::error::{CfrError, CfrResult};
use crate::game_tree::{GameTree, NodeId};
use crate::holdings::HoldingIndex;
use crate::street_values::{merge_add, Segment, SegmentRows, StreetValues};
use crate::stored_value::{StoredValue, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Regrets,
    Sumprobs,
}

impl StoreKind {
    pub fn prefix(self) -> &'static str {
        match self {
            StoreKind::Regrets => "regrets",
            StoreKind::Sumprobs => "sumprobs",
        }
    }
}

/// Everything that fixes the layout of a store.
#[derive(Clone, Copy)]
pub struct StoreShape<'a> {
    pub tree: &'a GameTree,
    pub index: &'a HoldingIndex,
    pub buckets: &'a Buckets,
    pub root_street: usize,
    pub root_board: usize,
    /// Streets from here on get one segment per board of this street.
    pub split_street: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ValueStore {
    pub kind: StoreKind,
    pub players: [bool; 2],
    pub root_street: usize,
    pub root_board: usize,
    pub streets: Vec<Option<StreetValues>>,
}

pub fn value_file(dir: &Path, kind: StoreKind, street: usize, player: usize, iteration: u64) -> PathBuf {
    dir.join(format!("{}.{}.p{}.{}", kind.prefix(), street, player, iteration))
}

impl ValueStore {
    /// Zero-filled rows for every decision node of an in-scope player.
    pub fn allocate_and_clear(
        kind: StoreKind,
        shape: StoreShape<'_>,
        widths: &[Width],
        players: [bool; 2],
    ) -> ValueStore {
        let tree = shape.tree;
        let index = shape.index;
        let mut streets = Vec::with_capacity(tree.num_streets());
        for s in 0..tree.num_streets() {
            if s < shape.root_street {
                streets.push(None);
                continue;
            }
            let num_nts: Vec<usize> = (0..tree.num_players())
                .map(|p| if players[p] { tree.num_nonterminals(p, s) } else { 0 })
                .collect();
            let nhcp = index.num_hole_card_pairs(s);
            let bucketed = shape.buckets.is_bucketed(s);
            let ranges: Vec<Range<usize>> = if bucketed {
                vec![0..1]
            } else {
                match shape.split_street {
                    Some(split) if s >= split => index
                        .successor_board_range(shape.root_street, shape.root_board, split)
                        .map(|b| index.successor_board_range(split, b, s))
                        .collect(),
                    _ => vec![index.successor_board_range(shape.root_street, shape.root_board, s)],
                }
            };
            let segments = ranges
                .into_iter()
                .map(|r| {
                    let num_holdings = if bucketed {
                        shape.buckets.num_buckets(s)
                    } else {
                        r.len() * nhcp
                    };
                    Some(Segment {
                        first_board: r.start,
                        num_boards: r.len(),
                        num_holdings,
                        rows: SegmentRows::new(widths[s], &num_nts),
                    })
                })
                .collect();
            streets.push(Some(StreetValues {
                street: s,
                width: widths[s],
                bucketed,
                num_hole_card_pairs: nhcp,
                segments,
            }));
        }

        for n in tree.preorder(tree.root()) {
            let node = tree.node(n);
            if node.terminal || node.succs.len() <= 1 || !players[node.player] {
                continue;
            }
            if let Some(sv) = streets[node.street].as_mut() {
                sv.allocate(node.player, node.id as usize, node.succs.len());
            }
        }

        let store = ValueStore {
            kind,
            players,
            root_street: shape.root_street,
            root_board: shape.root_board,
            streets,
        };
        debug!(
            "allocated {} store rooted at street {} board {}: {} bytes",
            kind.prefix(),
            shape.root_street,
            shape.root_board,
            store.memory_bytes()
        );
        store
    }

    pub fn street(&self, street: usize) -> &StreetValues {
        match &self.streets[street] {
            Some(sv) => sv,
            None => panic!("store has no values for street {}", street),
        }
    }

    pub fn street_mut(&mut self, street: usize) -> &mut StreetValues {
        match &mut self.streets[street] {
            Some(sv) => sv,
            None => panic!("store has no values for street {}", street),
        }
    }

    pub fn memory_bytes(&self) -> usize {
        let mut total = 0;
        for sv in self.streets.iter().flatten() {
            for seg in sv.segments.iter().flatten() {
                crate::with_table!(&seg.rows, table => {
                    for rows in table.nodes.iter().flatten().flatten() {
                        total += rows.data.len() * sv.width.bytes();
                    }
                })
            }
        }
        total
    }

    /// Raises every stored value of one node to at least `floor`.
    pub fn floor(&mut self, player: usize, street: usize, nt: usize, floor: f64) {
        self.street_mut(street).floor_node(player, nt, floor);
    }

    /// Applies a per-street floor to every node; `None` leaves a street alone.
    pub fn floor_all(&mut self, floors: &[Option<f64>]) {
        for sv in self.streets.iter_mut().flatten() {
            let Some(floor) = floors.get(sv.street).copied().flatten() else {
                continue;
            };
            for p in 0..2 {
                for nt in 0..sv.num_nonterminals(p) {
                    sv.floor_node(p, nt, floor);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sharding
    // -----------------------------------------------------------------------

    fn shard_ordinal(&self, index: &HoldingIndex, split: usize, board: usize) -> usize {
        let range = index.successor_board_range(self.root_street, self.root_board, split);
        assert!(
            range.contains(&board),
            "board {} outside the store's split range {:?}",
            board,
            range
        );
        board - range.start
    }

    /// Moves the rows of every street from `split` on that descend from
    /// `board` into a store of their own.
    pub fn take_shard(&mut self, index: &HoldingIndex, split: usize, board: usize) -> ValueStore {
        let ordinal = self.shard_ordinal(index, split, board);
        let streets = self
            .streets
            .iter_mut()
            .map(|slot| match slot {
                Some(sv) if sv.street >= split => {
                    let seg = match sv.segments.get_mut(ordinal).and_then(Option::take) {
                        Some(seg) => seg,
                        None => panic!("shard {} of street {} already taken", board, sv.street),
                    };
                    Some(StreetValues {
                        street: sv.street,
                        width: sv.width,
                        bucketed: sv.bucketed,
                        num_hole_card_pairs: sv.num_hole_card_pairs,
                        segments: vec![Some(seg)],
                    })
                }
                _ => None,
            })
            .collect();
        ValueStore {
            kind: self.kind,
            players: self.players,
            root_street: split,
            root_board: board,
            streets,
        }
    }

    pub fn restore_shard(&mut self, index: &HoldingIndex, mut shard: ValueStore) {
        let ordinal = self.shard_ordinal(index, shard.root_street, shard.root_board);
        for (slot, taken) in self.streets.iter_mut().zip(shard.streets.iter_mut()) {
            if let (Some(sv), Some(part)) = (slot.as_mut(), taken.as_mut()) {
                sv.segments[ordinal] = part.segments.pop().flatten();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn check_shape(&self, tree: &GameTree, player: usize, sv: &StreetValues) -> CfrResult<()> {
        let expected = tree.num_nonterminals(player, sv.street);
        let found = sv.num_nonterminals(player);
        if expected != found {
            return Err(CfrError::NodeCountMismatch {
                player,
                street: sv.street,
                expected,
                found,
            });
        }
        if sv.segments.iter().any(Option::is_none) {
            return Err(CfrError::Invariant(format!(
                "street {} has rows checked out to a worker",
                sv.street
            )));
        }
        Ok(())
    }

    fn scope(&self, tree: &GameTree, player: Option<usize>) -> Vec<usize> {
        (0..tree.num_players())
            .filter(|&p| self.players[p] && player.map_or(true, |only| only == p))
            .collect()
    }

    /// Writes one file per (player, street), rows in tree pre-order.
    pub fn write(&self, dir: &Path, iteration: u64, tree: &GameTree, player: Option<usize>) -> CfrResult<()> {
        std::fs::create_dir_all(dir)?;
        for p in self.scope(tree, player) {
            for sv in self.streets.iter().flatten() {
                self.check_shape(tree, p, sv)?;
                let path = value_file(dir, self.kind, sv.street, p, iteration);
                let mut w = BufWriter::new(File::create(&path)?);
                for n in tree.decision_nodes(p, sv.street) {
                    let nt = tree.nonterminal_id(n);
                    for seg in sv.segments.iter().flatten() {
                        seg.write_node(p, nt, &mut w)?;
                    }
                }
                w.flush()?;
            }
        }
        info!(
            "wrote {} for iteration {} to {}",
            self.kind.prefix(),
            iteration,
            dir.display()
        );
        Ok(())
    }

    /// Reads files produced by `write` for a store of the same shape.
    pub fn read(&mut self, dir: &Path, iteration: u64, tree: &GameTree, player: Option<usize>) -> CfrResult<()> {
        let kind = self.kind;
        for p in self.scope(tree, player) {
            for slot in self.streets.iter_mut() {
                let Some(sv) = slot.as_mut() else {
                    continue;
                };
                let expected = tree.num_nonterminals(p, sv.street);
                if sv.num_nonterminals(p) != expected {
                    return Err(CfrError::NodeCountMismatch {
                        player: p,
                        street: sv.street,
                        expected,
                        found: sv.num_nonterminals(p),
                    });
                }
                let path = value_file(dir, kind, sv.street, p, iteration);
                let file = match File::open(&path) {
                    Ok(f) => f,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(CfrError::MissingFile(path))
                    }
                    Err(e) => return Err(e.into()),
                };
                let mut r = BufReader::new(file);
                for n in tree.decision_nodes(p, sv.street) {
                    let nt = tree.nonterminal_id(n);
                    for seg in sv.segments.iter_mut().flatten() {
                        seg.read_node(p, nt, &mut r).map_err(|e| match e.kind() {
                            ErrorKind::UnexpectedEof => CfrError::Truncated { path: path.clone() },
                            _ => CfrError::Io(e),
                        })?;
                    }
                }
                let mut probe = [0u8; 1];
                if r.read(&mut probe)? != 0 {
                    return Err(CfrError::TrailingData { path });
                }
            }
        }
        debug!("read {} for iteration {}", kind.prefix(), iteration);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    /// Copies this subgame store into `parent`. `parent_node` is the node
    /// of `parent_tree` corresponding to the root of `sub_tree`. Exact rows
    /// overwrite the parent's rows for the subgame's boards; bucketed rows
    /// are added.
    pub fn merge_into(
        &self,
        parent: &mut ValueStore,
        parent_tree: &GameTree,
        parent_node: NodeId,
        sub_tree: &GameTree,
        index: &HoldingIndex,
    ) -> CfrResult<()> {
        if parent.kind != self.kind {
            return Err(CfrError::Config(format!(
                "cannot merge {} into {}",
                self.kind.prefix(),
                parent.kind.prefix()
            )));
        }
        let mut seen = HashSet::new();
        let mut stack = vec![(parent_node, sub_tree.root())];
        while let Some((pn, sn)) = stack.pop() {
            if !seen.insert(sn) {
                continue;
            }
            let (full, sub) = (parent_tree.node(pn), sub_tree.node(sn));
            if full.terminal != sub.terminal || full.succs.len() != sub.succs.len() {
                return Err(CfrError::Invariant(format!(
                    "trees diverge: node {} has {} successors, subgame node {} has {}",
                    pn,
                    full.succs.len(),
                    sn,
                    sub.succs.len()
                )));
            }
            if full.terminal {
                continue;
            }
            let p = sub.player;
            if sub.succs.len() > 1 && self.players[p] && parent.players[p] {
                self.merge_node(parent, p, sub.street, full.id as usize, sub.id as usize, index)?;
            }
            for (&a, &b) in full.succs.iter().zip(&sub.succs) {
                stack.push((a, b));
            }
        }
        info!(
            "merged {} subgame at street {} board {}",
            self.kind.prefix(),
            self.root_street,
            self.root_board
        );
        Ok(())
    }

    fn merge_node(
        &self,
        parent: &mut ValueStore,
        player: usize,
        street: usize,
        parent_nt: usize,
        sub_nt: usize,
        index: &HoldingIndex,
    ) -> CfrResult<()> {
        let src = self.street(street);
        let dst = parent.street_mut(street);
        if src.width != dst.width {
            return Err(CfrError::Config(format!(
                "street {}: subgame width {} differs from parent width {}",
                street, src.width, dst.width
            )));
        }
        if src.bucketed {
            let (Some(from), Some(to)) = (src.segments[0].as_ref(), dst.segments[0].as_mut()) else {
                return Err(CfrError::Invariant(format!("street {} rows missing", street)));
            };
            return merge_rows(&mut to.rows, &from.rows, player, parent_nt, sub_nt, None);
        }
        let nhcp = src.num_hole_card_pairs;
        let local_boards = index
            .successor_board_range(self.root_street, self.root_board, street)
            .len();
        for local in 0..local_boards {
            let board = index.global_index(self.root_street, self.root_board, street, local);
            let from = src.segment(board);
            let to = dst.segment_mut(board);
            let range_from = (board - from.first_board) * nhcp..(board - from.first_board + 1) * nhcp;
            let range_to = (board - to.first_board) * nhcp..(board - to.first_board + 1) * nhcp;
            copy_rows(&mut to.rows, &from.rows, player, parent_nt, sub_nt, range_to, range_from)?;
        }
        Ok(())
    }
}

fn typed_pair<'a, T: StoredValue>(
    dst: &'a mut crate::street_values::NodeTable<T>,
    src: &'a crate::street_values::NodeTable<T>,
    player: usize,
    dst_nt: usize,
    src_nt: usize,
) -> CfrResult<(&'a mut crate::street_values::Rows<T>, &'a crate::street_values::Rows<T>)> {
    let to = dst.nodes[player].get_mut(dst_nt).and_then(|r| r.as_mut());
    let from = src.nodes[player].get(src_nt).and_then(|r| r.as_ref());
    match (to, from) {
        (Some(to), Some(from)) if to.num_succs == from.num_succs => Ok((to, from)),
        (Some(to), Some(from)) => Err(CfrError::Invariant(format!(
            "successor count {} differs from {}",
            to.num_succs, from.num_succs
        ))),
        _ => Err(CfrError::Invariant(format!(
            "node {} has no rows to merge",
            src_nt
        ))),
    }
}

macro_rules! with_pair {
    ($dst:expr, $src:expr, $a:ident, $b:ident => $body:expr) => {
        match ($dst, $src) {
            (SegmentRows::U8($a), SegmentRows::U8($b)) => $body,
            (SegmentRows::U16($a), SegmentRows::U16($b)) => $body,
            (SegmentRows::I32($a), SegmentRows::I32($b)) => $body,
            (SegmentRows::F64($a), SegmentRows::F64($b)) => $body,
            _ => Err(CfrError::Invariant("width mismatch".to_string())),
        }
    };
}

fn copy_rows(
    dst: &mut SegmentRows,
    src: &SegmentRows,
    player: usize,
    dst_nt: usize,
    src_nt: usize,
    to: Range<usize>,
    from: Range<usize>,
) -> CfrResult<()> {
    with_pair!(dst, src, a, b => {
        let (to_rows, from_rows) = typed_pair(a, b, player, dst_nt, src_nt)?;
        let ns = to_rows.num_succs;
        to_rows.data[to.start * ns..to.end * ns]
            .copy_from_slice(&from_rows.data[from.start * ns..from.end * ns]);
        Ok(())
    })
}

fn merge_rows(
    dst: &mut SegmentRows,
    src: &SegmentRows,
    player: usize,
    dst_nt: usize,
    src_nt: usize,
    ceiling: Option<f64>,
) -> CfrResult<()> {
    with_pair!(dst, src, a, b => {
        let (to_rows, from_rows) = typed_pair(a, b, player, dst_nt, src_nt)?;
        let ns = to_rows.num_succs;
        for (d, s) in to_rows.data.chunks_mut(ns).zip(from_rows.data.chunks(ns)) {
            merge_add(d, s, ceiling);
        }
        Ok(())
    })
}
