//! The pairwise distance seam.
//!
//! The farm treats the distance as a pure function of two sequences. Any
//! `Fn(&[f64], &[f64]) -> f64 + Send + Sync` closure works; [`Dtw`] and
//! [`Euclidean`] are provided for convenience.

use serde::{Deserialize, Serialize};

/// Pure, deterministic distance between two sequences.
///
/// Implementations must not keep state between calls: workers invoke it
/// from several threads and in any order.
pub trait Distance: Send + Sync {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;
}

impl<F> Distance for F
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

/// Dynamic time warping on squared differences, returning the square root
/// of the warping-path cost.
///
/// * `window`: Sakoe-Chiba band half-width, widened to at least the length
///   difference so the end cell stays reachable. `None` means unbounded.
/// * `max_dist`: abandon early and return `f64::INFINITY` once every cell
///   of a row exceeds this distance.
/// * `penalty`: extra cost for a non-diagonal step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dtw {
    pub window: Option<usize>,
    pub max_dist: Option<f64>,
    pub penalty: f64,
}

impl Dtw {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }
}

impl Distance for Dtw {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let (n, m) = (a.len(), b.len());
        if n == 0 || m == 0 {
            return if n == m { 0.0 } else { f64::INFINITY };
        }
        let window = match self.window {
            Some(w) => w.max(n.abs_diff(m)),
            None => n.max(m),
        };
        let max_sq = self.max_dist.map(|d| d * d);
        let penalty_sq = self.penalty * self.penalty;

        let mut prev = vec![f64::INFINITY; m + 1];
        let mut curr = vec![f64::INFINITY; m + 1];
        prev[0] = 0.0;
        for i in 1..=n {
            curr.fill(f64::INFINITY);
            let lo = i.saturating_sub(window).max(1);
            let hi = (i + window).min(m);
            let mut row_min = f64::INFINITY;
            for j in lo..=hi {
                let d = a[i - 1] - b[j - 1];
                let best = prev[j - 1]
                    .min(prev[j] + penalty_sq)
                    .min(curr[j - 1] + penalty_sq);
                curr[j] = d * d + best;
                row_min = row_min.min(curr[j]);
            }
            if max_sq.is_some_and(|max| row_min > max) {
                return f64::INFINITY;
            }
            std::mem::swap(&mut prev, &mut curr);
        }
        let total = prev[m];
        if max_sq.is_some_and(|max| total > max) {
            f64::INFINITY
        } else {
            total.sqrt()
        }
    }
}

/// Lock-step Euclidean distance. Sequences of different lengths are
/// infinitely far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Euclidean;

impl Distance for Euclidean {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        if a.len() != b.len() {
            return f64::INFINITY;
        }
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: [f64; 9] = [0., 0., 1., 2., 1., 0., 1., 0., 0.];
    const S2: [f64; 9] = [0., 1., 2., 0., 0., 0., 0., 0., 0.];
    const S3: [f64; 9] = [1., 2., 0., 0., 0., 0., 0., 1., 1.];

    #[test]
    fn dtw_known_values() {
        let dtw = Dtw::default();
        assert!((dtw.distance(&S1, &S2) - 2f64.sqrt()).abs() < 1e-12);
        assert!((dtw.distance(&S1, &S3) - 5f64.sqrt()).abs() < 1e-12);
        assert!((dtw.distance(&S2, &S3) - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn dtw_identity_and_symmetry() {
        let dtw = Dtw::default();
        assert_eq!(dtw.distance(&S1, &S1), 0.0);
        assert_eq!(dtw.distance(&S2, &S3), dtw.distance(&S3, &S2));
    }

    #[test]
    fn dtw_unequal_lengths() {
        let dtw = Dtw::with_window(0);
        // window widens to the length difference
        assert!((dtw.distance(&[0.0, 0.0], &[1.0]) - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(dtw.distance(&[], &[1.0]), f64::INFINITY);
        assert_eq!(dtw.distance(&[], &[]), 0.0);
    }

    #[test]
    fn dtw_max_dist_abandons() {
        let dtw = Dtw {
            max_dist: Some(1.0),
            ..Dtw::default()
        };
        assert_eq!(dtw.distance(&S1, &S3), f64::INFINITY);
    }

    #[test]
    fn closures_are_distances() {
        let d = |a: &[f64], b: &[f64]| (a[0] - b[0]).abs();
        assert_eq!(d.distance(&[3.0], &[1.0]), 2.0);
    }

    #[test]
    fn euclidean_lock_step() {
        assert_eq!(Euclidean.distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
    }

    #[test]
    fn euclidean_needs_equal_lengths() {
        assert_eq!(Euclidean.distance(&[0.0, 3.0], &[0.0]), f64::INFINITY);
        assert_eq!(Euclidean.distance(&[], &[1.0]), f64::INFINITY);
        assert_eq!(Euclidean.distance(&[], &[]), 0.0);
    }
}
