//! Persistence, merging and flooring of value stores.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use vcfr::buckets::Buckets;
use vcfr::config::{SolverConfig, StreetConfig, Warmup};
use vcfr::error::CfrError;
use vcfr::game::GameSpec;
use vcfr::game_tree::{Action, GameTree, NodeId};
use vcfr::holdings::HoldingIndex;
use vcfr::solver::Solver;
use vcfr::stored_value::Width;
use vcfr::tree_builder::{build_tree, BettingConfig};
use vcfr::value_store::{value_file, StoreKind, StoreShape, ValueStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mixed_config() -> SolverConfig {
    SolverConfig {
        streets: vec![
            StreetConfig {
                regret_width: Width::I32,
                sumprob_width: Width::U16,
                regret_scaling: 100.0,
                ..StreetConfig::default()
            },
            StreetConfig {
                regret_width: Width::U8,
                sumprob_width: Width::F64,
                regret_scaling: 10.0,
                ..StreetConfig::default()
            },
        ],
        warmup: Warmup::Soft(1),
        seed: 3,
        ..SolverConfig::default()
    }
}

fn leduc_solver(config: SolverConfig, iterations: u64) -> Solver {
    let mut solver = Solver::new(&GameSpec::leduc(), config).unwrap();
    solver.run(iterations).unwrap();
    solver
}

/// Every stored row of both players, keyed by node order and holding.
fn snapshot(store: &ValueStore, tree: &GameTree, street: usize, boards: &[usize]) -> Vec<Vec<f64>> {
    let sv = store.street(street);
    let mut rows = Vec::new();
    for p in 0..2 {
        for n in tree.decision_nodes(p, street) {
            let nt = tree.nonterminal_id(n);
            for &b in boards {
                let seg = sv.segment(b);
                let base = if sv.bucketed { 0 } else { sv.board_offset(b) };
                let count = if sv.bucketed {
                    seg.num_holdings
                } else {
                    sv.num_hole_card_pairs
                };
                for h in base..base + count {
                    rows.push(seg.row_f64(p, nt, h));
                }
            }
        }
    }
    rows
}

/// Nodes of `parent` paired with the nodes of `sub`, starting from
/// `origin` and the subgame root.
fn paired_nodes(parent: &GameTree, origin: NodeId, sub: &GameTree) -> Vec<(NodeId, NodeId)> {
    let mut out = Vec::new();
    let mut stack = vec![(origin, sub.root())];
    while let Some((a, b)) = stack.pop() {
        if parent.is_terminal(a) {
            continue;
        }
        out.push((a, b));
        for i in 0..parent.num_successors(a) {
            stack.push((parent.successor(a, i), sub.successor(b, i)));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_round_trip_all_widths() {
    let solver = leduc_solver(mixed_config(), 20);
    let dir = tempdir().unwrap();
    solver.save(dir.path()).unwrap();

    let mut loaded = Solver::new(&GameSpec::leduc(), mixed_config()).unwrap();
    loaded.load(dir.path(), 20).unwrap();
    assert_eq!(loaded.iteration(), 20);

    let tree = &solver.context().tree;
    let boards: Vec<usize> = (0..solver.context().index.num_boards(1)).collect();
    for street in 0..2 {
        let b: &[usize] = if street == 0 { &[0] } else { &boards };
        assert_eq!(
            snapshot(solver.regrets(), tree, street, b),
            snapshot(loaded.regrets(), tree, street, b)
        );
        assert_eq!(
            snapshot(solver.sumprobs(), tree, street, b),
            snapshot(loaded.sumprobs(), tree, street, b)
        );
    }
}

#[test]
fn test_file_sizes_follow_widths() {
    let solver = leduc_solver(mixed_config(), 1);
    let dir = tempdir().unwrap();
    solver.save(dir.path()).unwrap();
    let ctx = solver.context();
    for p in 0..2 {
        let rows: usize = ctx
            .tree
            .decision_nodes(p, 0)
            .iter()
            .map(|&n| ctx.tree.num_successors(n) * 6)
            .sum();
        let path = value_file(dir.path(), StoreKind::Regrets, 0, p, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, rows * 4);
        let path = value_file(dir.path(), StoreKind::Sumprobs, 0, p, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, rows * 2);
    }
}

#[test]
fn test_missing_file() {
    let solver = leduc_solver(SolverConfig::default(), 2);
    let dir = tempdir().unwrap();
    solver.save(dir.path()).unwrap();
    let mut other = Solver::new(&GameSpec::leduc(), SolverConfig::default()).unwrap();
    match other.load(dir.path(), 3) {
        Err(CfrError::MissingFile(path)) => assert!(path.ends_with("regrets.0.p0.3")),
        result => panic!("expected MissingFile, got {:?}", result.err()),
    }
}

#[test]
fn test_truncated_file() {
    let solver = leduc_solver(SolverConfig::default(), 2);
    let dir = tempdir().unwrap();
    solver.save(dir.path()).unwrap();
    let path = value_file(dir.path(), StoreKind::Sumprobs, 1, 1, 2);
    let len = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();
    let mut other = Solver::new(&GameSpec::leduc(), SolverConfig::default()).unwrap();
    assert!(matches!(
        other.load(dir.path(), 2),
        Err(CfrError::Truncated { .. })
    ));
}

#[test]
fn test_trailing_data() {
    let solver = leduc_solver(SolverConfig::default(), 2);
    let dir = tempdir().unwrap();
    solver.save(dir.path()).unwrap();
    let path = value_file(dir.path(), StoreKind::Regrets, 0, 0, 2);
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(&[0u8]).unwrap();
    drop(f);
    let mut other = Solver::new(&GameSpec::leduc(), SolverConfig::default()).unwrap();
    assert!(matches!(
        other.load(dir.path(), 2),
        Err(CfrError::TrailingData { .. })
    ));
}

#[test]
fn test_node_count_mismatch() {
    let spec = GameSpec::leduc();
    let index = HoldingIndex::new(&spec.game);
    let buckets = Buckets::none(2);
    let plain = build_tree(&spec.game, &spec.betting).unwrap();
    let shared = build_tree(
        &spec.game,
        &BettingConfig {
            reentrant: true,
            ..BettingConfig::leduc()
        },
    )
    .unwrap();
    let shape = StoreShape {
        tree: &plain,
        index: &index,
        buckets: &buckets,
        root_street: 0,
        root_board: 0,
        split_street: None,
    };
    let mut store = ValueStore::allocate_and_clear(StoreKind::Regrets, shape, &[Width::F64; 2], [true, true]);
    let dir = tempdir().unwrap();
    store.write(dir.path(), 1, &plain, None).unwrap();
    assert!(matches!(
        store.read(dir.path(), 1, &shared, None),
        Err(CfrError::NodeCountMismatch { .. })
    ));
}

#[test]
fn test_write_one_player() {
    let solver = leduc_solver(SolverConfig::default(), 1);
    let dir = tempdir().unwrap();
    solver
        .regrets()
        .write(dir.path(), 1, &solver.context().tree, Some(1))
        .unwrap();
    assert!(!value_file(dir.path(), StoreKind::Regrets, 0, 0, 1).exists());
    assert!(value_file(dir.path(), StoreKind::Regrets, 0, 1, 1).exists());
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn test_subgame_merge_overwrites_its_boards() {
    let mut full = leduc_solver(SolverConfig::default(), 10);
    let origin = full
        .context()
        .tree
        .find_line(&[Action::Check, Action::Check])
        .unwrap();
    assert_eq!(full.context().tree.street(origin), 1);
    let num_hands = full.context().index.num_hole_card_pairs(1);
    let mut sub = full
        .for_subgame(origin, 1, [vec![0.5; num_hands], vec![1.0; num_hands]])
        .unwrap();
    sub.run(15).unwrap();

    let parent_tree = full.context().tree.clone();
    let before_other = snapshot(full.regrets(), &parent_tree, 1, &[0, 2]);
    sub.merge_into(&mut full).unwrap();
    assert_eq!(snapshot(full.regrets(), &parent_tree, 1, &[0, 2]), before_other);

    let sub_tree = &sub.context().tree;
    for (pn, sn) in paired_nodes(&parent_tree, origin, sub_tree) {
        if parent_tree.num_successors(pn) < 2 {
            continue;
        }
        let p = parent_tree.player_acting(pn);
        let full_sv = full.sumprobs().street(1);
        let sub_sv = sub.sumprobs().street(1);
        for h in 0..num_hands {
            let a = full_sv
                .segment(1)
                .row_f64(p, parent_tree.nonterminal_id(pn), full_sv.board_offset(1) + h);
            let b = sub_sv
                .segment(1)
                .row_f64(p, sub_tree.nonterminal_id(sn), sub_sv.board_offset(1) + h);
            assert_eq!(a, b);
        }
    }
}

fn bucketed_leduc(num_buckets: usize) -> Solver {
    let spec = GameSpec::leduc();
    let tree = build_tree(&spec.game, &spec.betting).unwrap();
    let index = Arc::new(HoldingIndex::new(&spec.game));
    let buckets = Arc::new(Buckets::by_strength(&index, num_buckets).unwrap());
    Solver::from_parts(tree, index, buckets, SolverConfig::default()).unwrap()
}

/// Street-1 rows of every bucket at one node; bucketed streets keep a
/// single segment.
fn bucket_rows(store: &ValueStore, player: usize, nt: usize, num_buckets: usize) -> Vec<Vec<f64>> {
    let seg = store.street(1).segment(0);
    (0..num_buckets).map(|b| seg.row_f64(player, nt, b)).collect()
}

/// Checks that every merged row equals its old value plus the matching
/// row of each subgame.
fn assert_rows_summed(
    parent_tree: &GameTree,
    origin: NodeId,
    before: &ValueStore,
    after: &ValueStore,
    subs: &[&Solver],
    num_buckets: usize,
) {
    let sub_tree = &subs[0].context().tree;
    let mut checked = 0;
    let mut added_mass = 0.0;
    for (pn, sn) in paired_nodes(parent_tree, origin, sub_tree) {
        if parent_tree.num_successors(pn) < 2 {
            continue;
        }
        let p = parent_tree.player_acting(pn);
        let pnt = parent_tree.nonterminal_id(pn);
        let snt = sub_tree.nonterminal_id(sn);
        let was = bucket_rows(before, p, pnt, num_buckets);
        let now = bucket_rows(after, p, pnt, num_buckets);
        let adds: Vec<Vec<Vec<f64>>> = subs
            .iter()
            .map(|sub| bucket_rows(sub.sumprobs(), p, snt, num_buckets))
            .collect();
        for b in 0..num_buckets {
            assert_eq!(now[b].len(), parent_tree.num_successors(pn));
            for s in 0..now[b].len() {
                let added: f64 = adds.iter().map(|rows| rows[b][s]).sum();
                added_mass += added;
                assert_abs_diff_eq!(now[b][s], was[b][s] + added, epsilon = 1e-9);
            }
        }
        checked += 1;
    }
    assert!(checked > 0);
    assert!(added_mass > 0.0);
}

#[test]
fn test_bucketed_merge_adds() {
    let mut full = bucketed_leduc(3);
    full.run(5).unwrap();

    let parent_tree = full.context().tree.clone();
    let origin = parent_tree.find_line(&[Action::Check, Action::Check]).unwrap();
    let n = full.context().index.num_hole_card_pairs(1);
    let mut sub = full.for_subgame(origin, 0, [vec![1.0; n], vec![1.0; n]]).unwrap();
    sub.run(5).unwrap();

    let before = full.sumprobs().clone();
    sub.merge_into(&mut full).unwrap();
    assert_rows_summed(&parent_tree, origin, &before, full.sumprobs(), &[&sub], 3);
}

#[test]
fn test_bucketed_merge_of_two_boards_accumulates() {
    let mut full = bucketed_leduc(3);
    full.run(5).unwrap();

    let parent_tree = full.context().tree.clone();
    let origin = parent_tree.find_line(&[Action::Check, Action::Check]).unwrap();
    let n = full.context().index.num_hole_card_pairs(1);
    let mut sub0 = full.for_subgame(origin, 0, [vec![1.0; n], vec![1.0; n]]).unwrap();
    let mut sub1 = full.for_subgame(origin, 1, [vec![0.5; n], vec![1.0; n]]).unwrap();
    sub0.run(4).unwrap();
    sub1.run(6).unwrap();
    assert_eq!(sub0.context().root_board, 0);
    assert_eq!(sub1.context().root_board, 1);

    let before = full.sumprobs().clone();
    sub0.merge_into(&mut full).unwrap();
    sub1.merge_into(&mut full).unwrap();
    assert_rows_summed(&parent_tree, origin, &before, full.sumprobs(), &[&sub0, &sub1], 3);
}

#[test]
fn test_merge_into_wrong_node_fails() {
    let mut full = leduc_solver(SolverConfig::default(), 2);
    let tree = full.context().tree.clone();
    let origin = tree.find_line(&[Action::Check, Action::Check]).unwrap();
    let n = full.context().index.num_hole_card_pairs(1);
    let sub = full.for_subgame(origin, 0, [vec![1.0; n], vec![1.0; n]]).unwrap();
    let fold = tree.find_line(&[Action::Bet(3), Action::Fold]).unwrap();
    let index = Arc::clone(&full.context().index);
    let mut parent_regrets = full.regrets().clone();
    let result = sub
        .regrets()
        .merge_into(&mut parent_regrets, &tree, fold, &sub.context().tree, &index);
    assert!(matches!(result, Err(CfrError::Invariant(_))));
    // The solver-level merge still works for the right node.
    sub.merge_into(&mut full).unwrap();
}

// ---------------------------------------------------------------------------
// Flooring
// ---------------------------------------------------------------------------

#[test]
fn test_floor_all_raises_regrets() {
    let config = SolverConfig {
        update: vcfr::config::UpdateRule::Cfr,
        ..SolverConfig::default()
    };
    let solver = leduc_solver(config, 10);
    let tree = solver.context().tree.clone();
    let mut regrets = solver.regrets().clone();
    let had_negative = snapshot(&regrets, &tree, 0, &[0])
        .iter()
        .flatten()
        .any(|&v| v < 0.0);
    assert!(had_negative);
    regrets.floor_all(&[Some(-0.5), None]);
    for v in snapshot(&regrets, &tree, 0, &[0]).iter().flatten() {
        assert!(*v >= -0.5);
    }
    let boards: Vec<usize> = (0..3).collect();
    assert_eq!(
        snapshot(&regrets, &tree, 1, &boards),
        snapshot(solver.regrets(), &tree, 1, &boards)
    );

    let n = tree.decision_nodes(0, 0)[0];
    regrets.floor(0, 0, tree.nonterminal_id(n), 0.0);
    let seg = regrets.street(0).segment(0);
    for h in 0..6 {
        assert!(seg.row_f64(0, tree.nonterminal_id(n), h).iter().all(|&v| v >= 0.0));
    }
}
