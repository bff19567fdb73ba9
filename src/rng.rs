//! The simulator's single seeded random source.
//!
//! Grounded on `mqns/utils/random.py`: a module-level `rng` reseeded by
//! `set_seed`, plus a deterministic `FixedRng` used in tests. Rather than a
//! global, the `Rng` here is owned by the `Simulator` and threaded by
//! `&mut` reference to every call site that needs a stochastic draw
//! (attempt success, swap success, path selection), so two runs built with
//! the same seed draw from the stream in the same order and produce
//! bit-identical counters.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use rand_distr::Distribution;

pub struct Rng {
    inner: StdRng,
}

impl Rng {
    pub fn seed(seed: u64) -> Self {
        Rng { inner: StdRng::seed_from_u64(seed) }
    }

    /// A single Bernoulli(p) trial, used for attempt/swap/purification
    /// success sampling.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        assert!((0.0..=1.0).contains(&p), "probability out of range: {p}");
        self.inner.gen::<f64>() < p
    }

    /// Number of Bernoulli(p) trials up to and including the first success,
    /// i.e. the "skip ahead" sample used by the link layer to jump straight
    /// to the attempt that succeeds instead of simulating every failure.
    pub fn geometric(&mut self, p: f64) -> u64 {
        assert!(p > 0.0 && p <= 1.0, "geometric probability out of range: {p}");
        let dist = rand_distr::Geometric::new(p).expect("valid geometric parameter");
        dist.sample(&mut self.inner) + 1
    }

    /// Pick one of `items` with probability proportional to `weight`.
    /// Returns `None` for an empty slice.
    pub fn choose_weighted<'a, T>(&mut self, items: &'a [T], weight: impl Fn(&T) -> f64) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let total: f64 = items.iter().map(&weight).sum();
        if total <= 0.0 {
            return self.choose_uniform(items);
        }
        let mut x = self.inner.gen::<f64>() * total;
        for item in items {
            x -= weight(item);
            if x <= 0.0 {
                return Some(item);
            }
        }
        items.last()
    }

    pub fn choose_uniform<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.inner.gen_range(0..items.len());
        items.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Rng::seed(100);
        let mut b = Rng::seed(100);
        let sample_a: Vec<u64> = (0..20).map(|_| a.geometric(0.2)).collect();
        let sample_b: Vec<u64> = (0..20).map(|_| b.geometric(0.2)).collect();
        assert_eq!(sample_a, sample_b);
    }

    #[test]
    fn geometric_is_at_least_one() {
        let mut r = Rng::seed(1);
        for _ in 0..1000 {
            assert!(r.geometric(0.5) >= 1);
        }
    }
}
