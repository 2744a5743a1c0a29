//! Row storage for one street.
//!
//! Layout: for every in-scope player and every nonterminal id on the street
//! that carries a decision, one contiguous array of
//! `num_holdings * num_succs` values. For holding `h`, successor `s`:
//!
//!   index = h * num_succs + s
//!
//! The holdings of a street are split into segments. An exact street has one
//! segment per contiguous board range (one per split board once the street
//! is sharded across workers); a bucketed street has a single segment whose
//! holdings are bucket ids.

use std::io::{Read, Write};

use rand::Rng;

use crate::regret_matching::{average_probs, pure_probs, regret_match};
use crate::stored_value::{StoredValue, Width};

/// Decision rows of one node, holding-major.
#[derive(Debug, Clone)]
pub struct Rows<T> {
    pub num_succs: usize,
    pub data: Vec<T>,
}

impl<T: StoredValue> Rows<T> {
    pub fn zeroed(num_holdings: usize, num_succs: usize) -> Rows<T> {
        Rows {
            num_succs,
            data: vec![T::default(); num_holdings * num_succs],
        }
    }

    #[inline]
    pub fn row(&self, holding: usize) -> &[T] {
        let base = holding * self.num_succs;
        &self.data[base..base + self.num_succs]
    }

    #[inline]
    pub fn row_mut(&mut self, holding: usize) -> &mut [T] {
        let base = holding * self.num_succs;
        &mut self.data[base..base + self.num_succs]
    }
}

/// `nodes[player][nonterminal_id]`; `None` for nodes without a decision.
#[derive(Debug, Clone)]
pub struct NodeTable<T> {
    pub nodes: Vec<Vec<Option<Rows<T>>>>,
}

impl<T: StoredValue> NodeTable<T> {
    pub fn new(num_nonterminals: &[usize]) -> NodeTable<T> {
        NodeTable {
            nodes: num_nonterminals
                .iter()
                .map(|&n| (0..n).map(|_| None).collect())
                .collect(),
        }
    }

    pub fn rows(&self, player: usize, nt: usize) -> &Rows<T> {
        match self.nodes[player].get(nt).and_then(|r| r.as_ref()) {
            Some(rows) => rows,
            None => panic!("no rows for player {} node {}", player, nt),
        }
    }

    pub fn rows_mut(&mut self, player: usize, nt: usize) -> &mut Rows<T> {
        match self.nodes[player].get_mut(nt).and_then(|r| r.as_mut()) {
            Some(rows) => rows,
            None => panic!("no rows for player {} node {}", player, nt),
        }
    }
}

/// Node table in one of the supported widths.
#[derive(Debug, Clone)]
pub enum SegmentRows {
    U8(NodeTable<u8>),
    U16(NodeTable<u16>),
    I32(NodeTable<i32>),
    F64(NodeTable<f64>),
}

/// Runs `$body` with `$t` bound to the typed node table.
#[macro_export]
macro_rules! with_table {
    ($rows:expr, $t:ident => $body:expr) => {
        match $rows {
            $crate::street_values::SegmentRows::U8($t) => $body,
            $crate::street_values::SegmentRows::U16($t) => $body,
            $crate::street_values::SegmentRows::I32($t) => $body,
            $crate::street_values::SegmentRows::F64($t) => $body,
        }
    };
}

impl SegmentRows {
    pub fn new(width: Width, num_nonterminals: &[usize]) -> SegmentRows {
        match width {
            Width::U8 => SegmentRows::U8(NodeTable::new(num_nonterminals)),
            Width::U16 => SegmentRows::U16(NodeTable::new(num_nonterminals)),
            Width::I32 => SegmentRows::I32(NodeTable::new(num_nonterminals)),
            Width::F64 => SegmentRows::F64(NodeTable::new(num_nonterminals)),
        }
    }

    pub fn width(&self) -> Width {
        match self {
            SegmentRows::U8(_) => Width::U8,
            SegmentRows::U16(_) => Width::U16,
            SegmentRows::I32(_) => Width::I32,
            SegmentRows::F64(_) => Width::F64,
        }
    }
}

/// How a row of stored numbers becomes action probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbRule {
    RegretMatch,
    Average,
    Pure,
}

/// Clamp range and overflow threshold applied when adding to a row.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
}

impl Bounds {
    pub const NONE: Bounds = Bounds {
        floor: None,
        ceiling: None,
    };
}

/// Adds `incr` to `row`, stochastically rounding each increment for integer
/// widths. If any entry would leave the representable range (or pass the
/// ceiling) the whole row is halved until it fits, then clamped to the floor.
pub fn add_to_row<T: StoredValue, G: Rng>(row: &mut [T], incr: &[f64], bounds: Bounds, rng: &mut G) {
    let mut cand = [0.0f64; 16];
    let mut heap;
    let cand: &mut [f64] = if row.len() <= cand.len() {
        &mut cand[..row.len()]
    } else {
        heap = vec![0.0f64; row.len()];
        heap.as_mut_slice()
    };
    for ((c, &old), &d) in cand.iter_mut().zip(row.iter()).zip(incr) {
        *c = old.to_f64() + T::round(d, rng);
    }
    store_halving(row, cand, bounds);
}

fn store_halving<T: StoredValue>(row: &mut [T], cand: &mut [f64], bounds: Bounds) {
    let hi = bounds.ceiling.map_or(T::MAX, |c| c.min(T::MAX));
    let signed_int = T::WIDTH == Width::I32;
    let out_of_range =
        |cand: &[f64]| cand.iter().any(|&c| c > hi || (signed_int && c < T::MIN));
    let mut halvings = 0;
    while out_of_range(cand) && halvings < 128 {
        cand.iter_mut().for_each(|c| *c /= 2.0);
        halvings += 1;
    }
    let lo = bounds.floor.map_or(T::MIN, |f| f.max(T::MIN));
    for (dst, &c) in row.iter_mut().zip(cand.iter()) {
        let v = if T::WIDTH.is_integer() { c.trunc() } else { c };
        *dst = T::from_f64(v.max(lo).min(hi));
    }
}

/// Element-wise sum used when merging bucketed rows.
pub fn merge_add<T: StoredValue>(dst: &mut [T], src: &[T], ceiling: Option<f64>) {
    let mut cand: Vec<f64> = dst
        .iter()
        .zip(src)
        .map(|(&a, &b)| a.to_f64() + b.to_f64())
        .collect();
    store_halving(dst, &mut cand, Bounds { floor: None, ceiling });
}

#[derive(Debug, Clone)]
pub struct Segment {
    /// First global board covered; unused on bucketed streets.
    pub first_board: usize,
    pub num_boards: usize,
    pub num_holdings: usize,
    pub rows: SegmentRows,
}

impl Segment {
    #[inline]
    pub fn contains(&self, board: usize) -> bool {
        board >= self.first_board && board < self.first_board + self.num_boards
    }

    /// Allocates zeroed rows for a node; a no-op when already present.
    pub fn allocate(&mut self, player: usize, nt: usize, num_succs: usize) {
        let num_holdings = self.num_holdings;
        with_table!(&mut self.rows, table => {
            let slot = &mut table.nodes[player][nt];
            if slot.is_none() {
                *slot = Some(Rows::zeroed(num_holdings, num_succs));
            }
        })
    }

    pub fn has_rows(&self, player: usize, nt: usize) -> bool {
        with_table!(&self.rows, table => {
            table.nodes[player].get(nt).map_or(false, |r| r.is_some())
        })
    }

    pub fn num_succs(&self, player: usize, nt: usize) -> Option<usize> {
        with_table!(&self.rows, table => {
            table.nodes[player].get(nt).and_then(|r| r.as_ref()).map(|r| r.num_succs)
        })
    }

    pub fn num_nonterminals(&self, player: usize) -> usize {
        with_table!(&self.rows, table => table.nodes[player].len())
    }

    /// Probabilities for each listed holding row, `holdings.len() * num_succs`
    /// values in `out`.
    pub fn probs(
        &self,
        player: usize,
        nt: usize,
        holdings: &[usize],
        rule: ProbRule,
        default: usize,
        out: &mut [f64],
    ) {
        with_table!(&self.rows, table => {
            let rows = table.rows(player, nt);
            let ns = rows.num_succs;
            for (i, &h) in holdings.iter().enumerate() {
                let dst = &mut out[i * ns..(i + 1) * ns];
                match rule {
                    ProbRule::RegretMatch => regret_match(rows.row(h), default, dst),
                    ProbRule::Average => average_probs(rows.row(h), dst),
                    ProbRule::Pure => pure_probs(rows.row(h), dst),
                }
            }
        })
    }

    /// Adds `incr[i * num_succs..]` to the row of `holdings[i]`, in order.
    pub fn add<G: Rng>(
        &mut self,
        player: usize,
        nt: usize,
        holdings: &[usize],
        incr: &[f64],
        bounds: Bounds,
        rng: &mut G,
    ) {
        with_table!(&mut self.rows, table => {
            let rows = table.rows_mut(player, nt);
            let ns = rows.num_succs;
            for (i, &h) in holdings.iter().enumerate() {
                add_to_row(rows.row_mut(h), &incr[i * ns..(i + 1) * ns], bounds, rng);
            }
        })
    }

    /// Raises every value of a node to at least `floor`.
    pub fn floor(&mut self, player: usize, nt: usize, floor: f64) {
        with_table!(&mut self.rows, table => {
            if let Some(rows) = table.nodes[player].get_mut(nt).and_then(|r| r.as_mut()) {
                floor_slice(&mut rows.data, floor);
            }
        })
    }

    pub fn row_f64(&self, player: usize, nt: usize, holding: usize) -> Vec<f64> {
        with_table!(&self.rows, table => {
            table.rows(player, nt).row(holding).iter().map(|v| v.to_f64()).collect()
        })
    }

    pub fn write_node<W: Write>(&self, player: usize, nt: usize, w: &mut W) -> std::io::Result<()> {
        with_table!(&self.rows, table => {
            for &v in &table.rows(player, nt).data {
                v.write_to(w)?;
            }
            Ok(())
        })
    }

    pub fn read_node<R: Read>(&mut self, player: usize, nt: usize, r: &mut R) -> std::io::Result<()> {
        with_table!(&mut self.rows, table => {
            for v in table.rows_mut(player, nt).data.iter_mut() {
                *v = StoredValue::read_from(r)?;
            }
            Ok(())
        })
    }
}

fn floor_slice<T: StoredValue>(data: &mut [T], floor: f64) {
    let lo = floor.max(T::MIN);
    for v in data.iter_mut() {
        if v.to_f64() < lo {
            *v = T::from_f64(if T::WIDTH.is_integer() { lo.ceil() } else { lo });
        }
    }
}

/// All stored rows for one street.
#[derive(Debug, Clone)]
pub struct StreetValues {
    pub street: usize,
    pub width: Width,
    pub bucketed: bool,
    /// Hole-card pairs per board on this street.
    pub num_hole_card_pairs: usize,
    pub segments: Vec<Option<Segment>>,
}

impl StreetValues {
    /// Segment holding the rows of `board`.
    pub fn segment(&self, board: usize) -> &Segment {
        let found = if self.bucketed {
            self.segments[0].as_ref()
        } else {
            self.segments.iter().flatten().find(|s| s.contains(board))
        };
        match found {
            Some(seg) => seg,
            None => panic!("street {} has no rows for board {}", self.street, board),
        }
    }

    pub fn segment_mut(&mut self, board: usize) -> &mut Segment {
        let street = self.street;
        let found = if self.bucketed {
            self.segments[0].as_mut()
        } else {
            self.segments.iter_mut().flatten().find(|s| s.contains(board))
        };
        match found {
            Some(seg) => seg,
            None => panic!("street {} has no rows for board {}", street, board),
        }
    }

    /// Row index of the first holding of `board` within its segment.
    pub fn board_offset(&self, board: usize) -> usize {
        (board - self.segment(board).first_board) * self.num_hole_card_pairs
    }

    pub fn allocate(&mut self, player: usize, nt: usize, num_succs: usize) {
        for seg in self.segments.iter_mut().flatten() {
            seg.allocate(player, nt, num_succs);
        }
    }

    pub fn floor_node(&mut self, player: usize, nt: usize, floor: f64) {
        for seg in self.segments.iter_mut().flatten() {
            seg.floor(player, nt, floor);
        }
    }

    pub fn num_nonterminals(&self, player: usize) -> usize {
        self.segments
            .iter()
            .flatten()
            .next()
            .map_or(0, |s| s.num_nonterminals(player))
    }
}
