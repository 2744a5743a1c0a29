//! Action probabilities from a row of regret-like numbers.

use crate::stored_value::StoredValue;

/// Probabilities proportional to the strictly positive entries of `row`.
/// With no positive entry all mass goes to `default`.
pub fn regret_match<T: StoredValue>(row: &[T], default: usize, out: &mut [f64]) {
    let positive_sum: f64 = row.iter().map(|&r| r.to_f64().max(0.0)).sum();
    if positive_sum > 0.0 {
        for (p, &r) in out.iter_mut().zip(row) {
            *p = r.to_f64().max(0.0) / positive_sum;
        }
    } else {
        out.iter_mut().for_each(|p| *p = 0.0);
        out[default] = 1.0;
    }
}

/// All mass on the first largest entry.
pub fn pure_probs<T: StoredValue>(row: &[T], out: &mut [f64]) {
    let mut best = 0;
    for (i, &r) in row.iter().enumerate().skip(1) {
        if r.to_f64() > row[best].to_f64() {
            best = i;
        }
    }
    out.iter_mut().for_each(|p| *p = 0.0);
    out[best] = 1.0;
}

/// Normalized cumulative strategy; uniform when the row is empty.
pub fn average_probs<T: StoredValue>(row: &[T], out: &mut [f64]) {
    let sum: f64 = row.iter().map(|&r| r.to_f64()).sum();
    if sum > 0.0 {
        for (p, &r) in out.iter_mut().zip(row) {
            *p = r.to_f64() / sum;
        }
    } else {
        let uniform = 1.0 / row.len() as f64;
        out.iter_mut().for_each(|p| *p = uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_positive_regret_gets_mass() {
        // successor 0 is check, successor 1 is bet
        let row = [-3.0f64, 5.0];
        let mut out = [0.0; 2];
        regret_match(&row, 0, &mut out);
        assert_eq!(out, [0.0, 1.0]);
    }

    #[test]
    fn proportional_to_positive_regret() {
        let row = [5i32, 3];
        let mut out = [0.0; 2];
        regret_match(&row, 0, &mut out);
        assert_eq!(out, [0.625, 0.375]);
    }

    #[test]
    fn no_positive_regret_plays_default() {
        let row = [0u16, 0, 0];
        let mut out = [0.0; 3];
        regret_match(&row, 1, &mut out);
        assert_eq!(out, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn widths_agree_bit_for_bit() {
        let mut a = [0.0; 3];
        let mut b = [0.0; 3];
        let mut c = [0.0; 3];
        regret_match(&[7u8, 0, 13], 0, &mut a);
        regret_match(&[7i32, -4, 13], 0, &mut b);
        regret_match(&[7.0f64, -1.5, 13.0], 0, &mut c);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn distribution_sums_to_one() {
        let row = [1.5f64, 0.25, 7.0, -2.0];
        let mut out = [0.0; 4];
        regret_match(&row, 0, &mut out);
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pure_picks_largest() {
        let mut out = [0.0; 3];
        pure_probs(&[2u16, 9, 9], &mut out);
        assert_eq!(out, [0.0, 1.0, 0.0]);
    }
}
