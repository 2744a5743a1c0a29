//! Vectorized terminal evaluation.
//!
//! Both evaluators run in O(hands) using per-card reach sums: the reach of
//! opponent hands disjoint from ours is the total, minus the hands sharing
//! either of our cards, plus the one hand sharing both (it was subtracted
//! twice).

use crate::holdings::{Hand, Showdown};

/// Opponent reach summed over all hands and per card.
struct CardSums {
    total: f64,
    per_card: Vec<f64>,
}

impl CardSums {
    fn new(deck_size: usize) -> CardSums {
        CardSums {
            total: 0.0,
            per_card: vec![0.0; deck_size],
        }
    }

    #[inline]
    fn add(&mut self, hand: &Hand, reach: f64) {
        self.total += reach;
        for c in hand.iter().filter(|c| !c.is_none()) {
            self.per_card[c.index()] += reach;
        }
    }

    #[inline]
    fn blocked(&self, hand: &Hand) -> f64 {
        let mut mass = self.total;
        for c in hand.iter().filter(|c| !c.is_none()) {
            mass -= self.per_card[c.index()];
        }
        mass
    }
}

/// Opponent reach over hands that share no card with each of our hands.
pub fn disjoint_mass(hands: &[Hand], opp_reach: &[f64], deck_size: usize, out: &mut [f64]) {
    let two_cards = hands.first().map_or(false, |h| !h[1].is_none());
    let mut sums = CardSums::new(deck_size);
    for (hand, &r) in hands.iter().zip(opp_reach) {
        sums.add(hand, r);
    }
    for (i, hand) in hands.iter().enumerate() {
        let mut mass = sums.blocked(hand);
        if two_cards {
            mass += opp_reach[i];
        }
        out[i] = mass;
    }
}

/// Values at a fold terminal: `amount` (signed from our side) times the
/// disjoint opponent reach.
pub fn fold_values(hands: &[Hand], opp_reach: &[f64], deck_size: usize, amount: f64, out: &mut [f64]) {
    disjoint_mass(hands, opp_reach, deck_size, out);
    for v in out.iter_mut() {
        *v *= amount;
    }
}

/// Values at a showdown: `stake` times (reach of weaker disjoint opponent
/// hands minus reach of stronger ones).
pub fn showdown_values(
    hands: &[Hand],
    showdown: &Showdown,
    opp_reach: &[f64],
    deck_size: usize,
    stake: f64,
    out: &mut [f64],
) {
    let order = &showdown.order;
    let strength = &showdown.strength;
    out.iter_mut().for_each(|v| *v = 0.0);

    // Ascending: hands strictly weaker than each group.
    let mut sums = CardSums::new(deck_size);
    let mut start = 0;
    while start < order.len() {
        let s = strength[order[start] as usize];
        let end = start + order[start..].iter().take_while(|&&h| strength[h as usize] == s).count();
        for &h in &order[start..end] {
            let h = h as usize;
            out[h] += sums.blocked(&hands[h]);
        }
        for &h in &order[start..end] {
            let h = h as usize;
            sums.add(&hands[h], opp_reach[h]);
        }
        start = end;
    }

    // Descending: hands strictly stronger.
    let mut sums = CardSums::new(deck_size);
    let mut end = order.len();
    while end > 0 {
        let s = strength[order[end - 1] as usize];
        let start = end
            - order[..end]
                .iter()
                .rev()
                .take_while(|&&h| strength[h as usize] == s)
                .count();
        for &h in &order[start..end] {
            let h = h as usize;
            out[h] -= sums.blocked(&hands[h]);
        }
        for &h in &order[start..end] {
            let h = h as usize;
            sums.add(&hands[h], opp_reach[h]);
        }
        end = start;
    }

    for v in out.iter_mut() {
        *v *= stake;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameDef;
    use crate::holdings::HoldingIndex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn overlaps(a: &Hand, b: &Hand) -> bool {
        a.iter().any(|c| !c.is_none() && b.contains(c))
    }

    #[test]
    fn showdown_matches_pairwise_loop() {
        let game = GameDef::new("small", 5, 2, 2, vec![0, 2]).unwrap();
        let index = HoldingIndex::new(&game);
        let mut rng = StdRng::seed_from_u64(3);
        for board in 0..index.num_boards(1) {
            let hands = index.hands(1, board);
            let sd = index.showdown(board);
            let reach: Vec<f64> = hands.iter().map(|_| rng.gen::<f64>()).collect();
            let mut fast = vec![0.0; hands.len()];
            showdown_values(&hands, sd, &reach, game.deck.size(), 3.0, &mut fast);
            for (i, h) in hands.iter().enumerate() {
                let mut slow = 0.0;
                for (j, o) in hands.iter().enumerate() {
                    if overlaps(h, o) {
                        continue;
                    }
                    match sd.strength[i].cmp(&sd.strength[j]) {
                        std::cmp::Ordering::Greater => slow += reach[j],
                        std::cmp::Ordering::Less => slow -= reach[j],
                        std::cmp::Ordering::Equal => {}
                    }
                }
                assert!((fast[i] - 3.0 * slow).abs() < 1e-9, "hand {} on board {}", i, board);
            }
        }
    }

    #[test]
    fn fold_counts_only_disjoint_hands() {
        let game = GameDef::new("small", 4, 2, 2, vec![0]).unwrap();
        let index = HoldingIndex::new(&game);
        let hands = index.hands(0, 0);
        let reach = vec![1.0; hands.len()];
        let mut out = vec![0.0; hands.len()];
        fold_values(&hands, &reach, game.deck.size(), -2.0, &mut out);
        // 8 cards: C(6, 2) = 15 disjoint opponent hands
        for v in out {
            assert_eq!(v, -30.0);
        }
    }

    #[test]
    fn one_card_fold_excludes_own_card() {
        let game = GameDef::kuhn();
        let index = HoldingIndex::new(&game);
        let hands = index.hands(0, 0);
        let mut out = vec![0.0; 3];
        fold_values(&hands, &[0.5, 1.0, 2.0], 3, 1.0, &mut out);
        assert_eq!(out, vec![3.0, 2.5, 1.5]);
    }
}
