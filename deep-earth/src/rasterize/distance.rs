//! Exact Euclidean distance transform (Felzenszwalb & Huttenlocher).

use ndarray::{Array2, Axis};

const FAR: f64 = 1e20;

/// Distance in pixels from every cell to the nearest non-zero cell of
/// `mask`. Returns `None` when the mask has no set cell.
pub fn euclidean_distance(mask: &Array2<u8>) -> Option<Array2<f32>> {
    if mask.iter().all(|&v| v == 0) {
        return None;
    }

    let (height, width) = mask.dim();
    let mut squared = mask.mapv(|v| if v != 0 { 0.0 } else { FAR });

    let n = height.max(width);
    let mut buffer = Buffers::new(n);

    for axis in [Axis(0), Axis(1)] {
        for mut lane in squared.lanes_mut(axis) {
            let len = lane.len();
            for (i, v) in lane.iter().enumerate() {
                buffer.f[i] = *v;
            }
            buffer.transform(len);
            for (i, v) in lane.iter_mut().enumerate() {
                *v = buffer.d[i];
            }
        }
    }

    Some(squared.mapv(|d| d.sqrt() as f32))
}

struct Buffers {
    f: Vec<f64>,
    d: Vec<f64>,
    v: Vec<usize>,
    z: Vec<f64>,
}

impl Buffers {
    fn new(n: usize) -> Self {
        Self {
            f: vec![0.0; n],
            d: vec![0.0; n],
            v: vec![0; n],
            z: vec![0.0; n + 1],
        }
    }

    /// 1D squared distance transform of `f[..n]` into `d[..n]` via the
    /// lower envelope of parabolas.
    fn transform(&mut self, n: usize) {
        let (f, d, v, z) = (&self.f, &mut self.d, &mut self.v, &mut self.z);
        let intersect = |q: usize, p: usize| -> f64 {
            let (qf, pf) = (q as f64, p as f64);
            ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
        };

        let mut k = 0;
        v[0] = 0;
        z[0] = f64::NEG_INFINITY;
        z[1] = f64::INFINITY;
        for q in 1..n {
            let mut s = intersect(q, v[k]);
            while s <= z[k] {
                k -= 1;
                s = intersect(q, v[k]);
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
        }

        k = 0;
        for (q, out) in d.iter_mut().enumerate().take(n) {
            while z[k + 1] < q as f64 {
                k += 1;
            }
            let delta = q as f64 - v[k] as f64;
            *out = delta * delta + f[v[k]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask() {
        assert!(euclidean_distance(&Array2::zeros((3, 3))).is_none());
    }

    #[test]
    fn test_single_point() {
        let mut mask = Array2::zeros((5, 5));
        mask[(2, 2)] = 1;
        let dist = euclidean_distance(&mask).unwrap();

        assert_eq!(dist[(2, 2)], 0.0);
        assert_eq!(dist[(2, 4)], 2.0);
        assert!((dist[(0, 0)] - 8.0_f32.sqrt()).abs() < 1e-6);
        assert!((dist[(4, 3)] - 5.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut mask = Array2::zeros((7, 9));
        for &(r, c) in &[(0, 0), (3, 7), (6, 2)] {
            mask[(r, c)] = 1;
        }
        let dist = euclidean_distance(&mask).unwrap();

        for ((r, c), &d) in dist.indexed_iter() {
            let expected = [(0usize, 0usize), (3, 7), (6, 2)]
                .iter()
                .map(|&(pr, pc)| {
                    let dr = r as f64 - pr as f64;
                    let dc = c as f64 - pc as f64;
                    (dr * dr + dc * dc).sqrt()
                })
                .fold(f64::INFINITY, f64::min);
            assert!((d as f64 - expected).abs() < 1e-5, "({}, {})", r, c);
        }
    }
}
