//! Card abstraction: optional per-street mapping from holding keys to
//! bucket ids shared across every board of the street.

use crate::error::{CfrError, CfrResult};
use crate::holdings::{HoldingIndex, HoldingKey};

#[derive(Debug, Clone)]
struct StreetBuckets {
    ids: Vec<u32>,
    num_buckets: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Buckets {
    streets: Vec<Option<StreetBuckets>>,
}

impl Buckets {
    /// No abstraction on any street.
    pub fn none(num_streets: usize) -> Buckets {
        Buckets {
            streets: vec![None; num_streets],
        }
    }

    pub fn set_street(
        &mut self,
        index: &HoldingIndex,
        street: usize,
        ids: Vec<u32>,
        num_buckets: usize,
    ) -> CfrResult<()> {
        let expected = index.num_boards(street) * index.num_hole_card_pairs(street);
        if ids.len() != expected {
            return Err(CfrError::Config(format!(
                "street {} needs {} bucket ids, got {}",
                street,
                expected,
                ids.len()
            )));
        }
        if let Some(&bad) = ids.iter().find(|&&id| id as usize >= num_buckets) {
            return Err(CfrError::Config(format!(
                "bucket id {} out of range for {} buckets",
                bad, num_buckets
            )));
        }
        self.streets[street] = Some(StreetBuckets { ids, num_buckets });
        Ok(())
    }

    /// Buckets the final street by showdown-strength percentile within each
    /// board.
    pub fn by_strength(index: &HoldingIndex, num_buckets: usize) -> CfrResult<Buckets> {
        let game = &index.game;
        let street = game.max_street();
        let nhcp = index.num_hole_card_pairs(street);
        let mut ids = vec![0u32; index.num_boards(street) * nhcp];
        for board in 0..index.num_boards(street) {
            let sd = index.showdown(board);
            for (pos, &hand) in sd.order.iter().enumerate() {
                let bucket = pos * num_buckets / nhcp;
                ids[board * nhcp + hand as usize] = bucket as u32;
            }
        }
        let mut buckets = Buckets::none(game.num_streets());
        buckets.set_street(index, street, ids, num_buckets)?;
        Ok(buckets)
    }

    #[inline]
    pub fn is_bucketed(&self, street: usize) -> bool {
        self.streets[street].is_some()
    }

    pub fn num_buckets(&self, street: usize) -> usize {
        self.streets[street].as_ref().map_or(0, |s| s.num_buckets)
    }

    #[inline]
    pub fn bucket(&self, street: usize, key: HoldingKey) -> usize {
        match &self.streets[street] {
            Some(s) => s.ids[key as usize] as usize,
            None => panic!("street {} is not bucketed", street),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameDef;

    #[test]
    fn strength_buckets_follow_showdown_order() {
        let index = HoldingIndex::new(&GameDef::leduc());
        let buckets = Buckets::by_strength(&index, 2).unwrap();
        assert!(!buckets.is_bucketed(0));
        assert!(buckets.is_bucketed(1));
        assert_eq!(buckets.num_buckets(1), 2);
        for board in 0..index.num_boards(1) {
            let sd = index.showdown(board);
            let weakest = index.holding_key(1, board, sd.order[0] as usize);
            let strongest = index.holding_key(1, board, *sd.order.last().unwrap() as usize);
            assert_eq!(buckets.bucket(1, weakest), 0);
            assert_eq!(buckets.bucket(1, strongest), 1);
        }
    }

    #[test]
    fn set_street_checks_ids() {
        let index = HoldingIndex::new(&GameDef::leduc());
        let mut buckets = Buckets::none(2);
        assert!(buckets.set_street(&index, 1, vec![0; 3], 1).is_err());
        let n = index.num_boards(1) * index.num_hole_card_pairs(1);
        assert!(buckets.set_street(&index, 1, vec![4; n], 4).is_err());
        buckets.set_street(&index, 1, vec![3; n], 4).unwrap();
        assert_eq!(buckets.bucket(1, 0), 3);
    }
}
