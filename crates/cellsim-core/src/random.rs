//! Reproducible random number infrastructure.
//!
//! A run owns exactly one [`Rrf`] context. Every consumer of randomness asks it
//! for a freshly spawned generator, so each stream is fully determined by the
//! seed and the order in which streams were spawned, never by how many values
//! other streams have drawn in the meantime.

use crate::config::{RandomConfig, RngKind};
use crate::error::{Error, Result};
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::{ChaCha12Rng, ChaCha20Rng, ChaCha8Rng};
use rand_distr::{Normal, StandardNormal};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// An infinite, type-erased draw sequence
pub type BoxedSequence<T> = Box<dyn Iterator<Item = T> + Send>;

/// A spawned bit generator of the configured family
#[derive(Debug, Clone)]
pub enum Generator {
    ChaCha8(ChaCha8Rng),
    ChaCha12(ChaCha12Rng),
    ChaCha20(ChaCha20Rng),
}

impl Generator {
    /// Generator for `seed`, positioned on its own independent `stream`
    pub fn new(kind: RngKind, seed: u64, stream: u64) -> Self {
        match kind {
            RngKind::ChaCha8 => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                Generator::ChaCha8(rng)
            }
            RngKind::ChaCha12 => {
                let mut rng = ChaCha12Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                Generator::ChaCha12(rng)
            }
            RngKind::ChaCha20 => {
                let mut rng = ChaCha20Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                Generator::ChaCha20(rng)
            }
        }
    }
}

impl RngCore for Generator {
    fn next_u32(&mut self) -> u32 {
        match self {
            Generator::ChaCha8(rng) => rng.next_u32(),
            Generator::ChaCha12(rng) => rng.next_u32(),
            Generator::ChaCha20(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Generator::ChaCha8(rng) => rng.next_u64(),
            Generator::ChaCha12(rng) => rng.next_u64(),
            Generator::ChaCha20(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Generator::ChaCha8(rng) => rng.fill_bytes(dest),
            Generator::ChaCha12(rng) => rng.fill_bytes(dest),
            Generator::ChaCha20(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        match self {
            Generator::ChaCha8(rng) => rng.try_fill_bytes(dest),
            Generator::ChaCha12(rng) => rng.try_fill_bytes(dest),
            Generator::ChaCha20(rng) => rng.try_fill_bytes(dest),
        }
    }
}

/// Reproducible random function context
#[derive(Debug, Clone)]
pub struct Rrf {
    seed: u64,
    kind: RngKind,
    spawned: u64,
}

impl Rrf {
    pub fn new(seed: u64, kind: RngKind) -> Self {
        Self {
            seed,
            kind,
            spawned: 0,
        }
    }

    pub fn from_config(config: &RandomConfig) -> Self {
        Self::new(config.seed, config.generator)
    }

    /// Reseed the context. Spawning restarts from the first stream.
    pub fn seed(&mut self, seed: u64) -> u64 {
        self.seed = seed;
        self.spawned = 0;
        debug!(seed, kind = ?self.kind, "random context seeded");
        seed
    }

    pub fn seed_value(&self) -> u64 {
        self.seed
    }

    /// Number of generators spawned since the last seeding
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Derive the next independent child generator
    pub fn spawn_generator(&mut self) -> Generator {
        let generator = Generator::new(self.kind, self.seed, self.spawned);
        trace!(stream = self.spawned, "generator spawned");
        self.spawned += 1;
        generator
    }

    /// Callable mode: a closure returning a fresh draw on every call
    pub fn callable<T, D>(&mut self, distribution: D) -> impl FnMut() -> T
    where
        D: Distribution<T>,
    {
        let mut rng = self.spawn_generator();
        move || distribution.sample(&mut rng)
    }

    /// Sequence mode: an infinite lazy sequence of draws
    pub fn sequence<T, D>(&mut self, distribution: D) -> DrawSequence<D, T>
    where
        D: Distribution<T>,
    {
        DrawSequence::new(distribution, self.spawn_generator())
    }

    pub fn normal(&mut self, mean: f64, std: f64) -> Result<DrawSequence<Normal<f64>, f64>> {
        let distribution = Normal::new(mean, std)?;
        Ok(self.sequence(distribution))
    }

    /// Uniform draws from `[low, high)`
    pub fn uniform(&mut self, low: f64, high: f64) -> Result<DrawSequence<Uniform<f64>, f64>> {
        let distribution = uniform_distribution(low, high)?;
        Ok(self.sequence(distribution))
    }

    /// Uniform draws of `len` values at once
    pub fn uniform_array(
        &mut self,
        low: f64,
        high: f64,
        len: usize,
    ) -> Result<DrawSequence<UniformArray, Vec<f64>>> {
        let distribution = UniformArray {
            element: uniform_distribution(low, high)?,
            len,
        };
        Ok(self.sequence(distribution))
    }

    /// Integers from `[low, high)`
    pub fn integers(&mut self, low: i64, high: i64) -> Result<DrawSequence<Uniform<i64>, i64>> {
        if low >= high {
            return Err(Error::Distribution(format!(
                "empty integer range [{}, {})",
                low, high
            )));
        }
        Ok(self.sequence(Uniform::new(low, high)))
    }

    pub fn multivariate_normal(
        &mut self,
        mean: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> Result<DrawSequence<MultivariateNormal, Vec<f64>>> {
        let distribution = MultivariateNormal::new(mean, covariance)?;
        Ok(self.sequence(distribution))
    }
}

impl Default for Rrf {
    fn default() -> Self {
        Self::from_config(&RandomConfig::default())
    }
}

fn uniform_distribution(low: f64, high: f64) -> Result<Uniform<f64>> {
    if !(low.is_finite() && high.is_finite()) || low > high {
        return Err(Error::Distribution(format!(
            "invalid uniform range [{}, {})",
            low, high
        )));
    }
    if low == high {
        Ok(Uniform::new_inclusive(low, high))
    } else {
        Ok(Uniform::new(low, high))
    }
}

/// Infinite sequence of draws from one distribution on its own generator
#[derive(Debug, Clone)]
pub struct DrawSequence<D, T> {
    distribution: D,
    rng: Generator,
    _marker: PhantomData<fn() -> T>,
}

impl<D, T> DrawSequence<D, T>
where
    D: Distribution<T>,
{
    pub fn new(distribution: D, rng: Generator) -> Self {
        Self {
            distribution,
            rng,
            _marker: PhantomData,
        }
    }
}

impl<D, T> Iterator for DrawSequence<D, T>
where
    D: Distribution<T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        Some(self.distribution.sample(&mut self.rng))
    }
}

/// Several independent uniform values per draw
#[derive(Debug, Clone, Copy)]
pub struct UniformArray {
    element: Uniform<f64>,
    len: usize,
}

impl Distribution<Vec<f64>> for UniformArray {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.len).map(|_| self.element.sample(rng)).collect()
    }
}

/// Multivariate normal distribution, sampled through a Cholesky factor
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    mean: Vec<f64>,
    factor: Vec<Vec<f64>>,
}

impl MultivariateNormal {
    pub fn new(mean: Vec<f64>, covariance: Vec<Vec<f64>>) -> Result<Self> {
        let n = mean.len();
        if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
            return Err(Error::Distribution(format!(
                "covariance must be {}x{}",
                n, n
            )));
        }
        for i in 0..n {
            for j in 0..i {
                if (covariance[i][j] - covariance[j][i]).abs() > 1e-12 {
                    return Err(Error::Distribution("covariance must be symmetric".to_string()));
                }
            }
        }

        let mut factor = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let mut sum = covariance[i][j];
                for k in 0..j {
                    sum -= factor[i][k] * factor[j][k];
                }
                if i == j {
                    if sum < -1e-12 {
                        return Err(Error::Distribution(
                            "covariance must be positive semi-definite".to_string(),
                        ));
                    }
                    factor[i][i] = sum.max(0.0).sqrt();
                } else if factor[j][j] > 0.0 {
                    factor[i][j] = sum / factor[j][j];
                }
            }
        }

        Ok(Self { mean, factor })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }
}

impl Distribution<Vec<f64>> for MultivariateNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z: Vec<f64> = (0..self.mean.len())
            .map(|_| StandardNormal.sample(rng))
            .collect();
        self.mean
            .iter()
            .zip(&self.factor)
            .map(|(mean, row)| mean + row.iter().zip(&z).map(|(l, z)| l * z).sum::<f64>())
            .collect()
    }
}

/// Map every drawn value through `func`
pub fn wrap<I, F, T>(sequence: I, func: F) -> std::iter::Map<I, F>
where
    I: Iterator,
    F: FnMut(I::Item) -> T,
{
    sequence.map(func)
}

/// A fixed group of sequences drawn from together
pub trait DrawTuple {
    type Values;

    /// One value from every member, or `None` once any member is exhausted
    fn draw(&mut self) -> Option<Self::Values>;
}

macro_rules! impl_draw_tuple {
    ($($name:ident),+) => {
        impl<$($name: Iterator),+> DrawTuple for ($($name,)+) {
            type Values = ($($name::Item,)+);

            #[allow(non_snake_case)]
            fn draw(&mut self) -> Option<Self::Values> {
                let ($($name,)+) = self;
                Some(($($name.next()?,)+))
            }
        }
    };
}

impl_draw_tuple!(A);
impl_draw_tuple!(A, B);
impl_draw_tuple!(A, B, C);
impl_draw_tuple!(A, B, C, D);

/// Sequence produced by [`compose`]
pub struct Compose<S, F> {
    sources: S,
    func: F,
}

impl<S, F, T> Iterator for Compose<S, F>
where
    S: DrawTuple,
    F: FnMut(S::Values) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.sources.draw().map(&mut self.func)
    }
}

/// Draw one value from each source and combine them with `func`
pub fn compose<S, F, T>(func: F, sources: S) -> Compose<S, F>
where
    S: DrawTuple,
    F: FnMut(S::Values) -> T,
{
    Compose { sources, func }
}

/// Call `func` once per outer iteration and yield everything it produces.
///
/// Returning an empty iterator (e.g. `None`) rejects that round, which makes
/// this the building block for rejection sampling. A `func` that never yields
/// loops forever.
pub fn chain<F, I>(func: F) -> std::iter::Flatten<std::iter::RepeatWith<F>>
where
    F: FnMut() -> I,
    I: IntoIterator,
{
    std::iter::repeat_with(func).flatten()
}

/// Values that can be tested against an open interval
pub trait WithinBounds {
    fn within_bounds(&self, minimum: f64, maximum: f64) -> bool;
}

impl WithinBounds for f64 {
    fn within_bounds(&self, minimum: f64, maximum: f64) -> bool {
        maximum > *self && *self > minimum
    }
}

impl WithinBounds for Vec<f64> {
    fn within_bounds(&self, minimum: f64, maximum: f64) -> bool {
        self.iter().all(|value| value.within_bounds(minimum, maximum))
    }
}

impl<const N: usize> WithinBounds for [f64; N] {
    fn within_bounds(&self, minimum: f64, maximum: f64) -> bool {
        self.iter().all(|value| value.within_bounds(minimum, maximum))
    }
}

/// Keep only values strictly inside `(minimum, maximum)`; arrays must have
/// every element inside. Unreachable bounds stall the sequence forever.
pub fn enforce_bounds<I>(
    sequence: I,
    minimum: f64,
    maximum: f64,
) -> std::iter::Filter<I, impl FnMut(&I::Item) -> bool>
where
    I: Iterator,
    I::Item: WithinBounds,
{
    sequence.filter(move |value| value.within_bounds(minimum, maximum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_draws() {
        let mut first = Rrf::new(1, RngKind::ChaCha12);
        let mut second = Rrf::new(1, RngKind::ChaCha12);

        let a: Vec<f64> = first.normal(0.0, 1.0).unwrap().take(10).collect();
        let b: Vec<f64> = second.normal(0.0, 1.0).unwrap().take(10).collect();
        assert_eq!(a, b);

        let mut other = Rrf::new(2, RngKind::ChaCha12);
        let c: Vec<f64> = other.normal(0.0, 1.0).unwrap().take(10).collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_spawned_streams_are_order_independent() {
        let mut rrf = Rrf::new(5, RngKind::ChaCha8);
        let mut first = rrf.uniform(0.0, 1.0).unwrap();
        let mut second = rrf.uniform(0.0, 1.0).unwrap();

        // Draining the first stream must not influence the second
        let _: Vec<f64> = first.by_ref().take(100).collect();
        let second_values: Vec<f64> = second.by_ref().take(5).collect();

        let mut fresh = Rrf::new(5, RngKind::ChaCha8);
        let _unused = fresh.uniform(0.0, 1.0).unwrap();
        let expected: Vec<f64> = fresh.uniform(0.0, 1.0).unwrap().take(5).collect();
        assert_eq!(second_values, expected);
        assert_ne!(first.next(), second.next());
    }

    #[test]
    fn test_reseed_restarts_streams() {
        let mut rrf = Rrf::new(3, RngKind::ChaCha20);
        let before: Vec<f64> = rrf.uniform(0.0, 1.0).unwrap().take(3).collect();
        let _ = rrf.spawn_generator();
        assert_eq!(rrf.spawned(), 2);

        assert_eq!(rrf.seed(3), 3);
        assert_eq!(rrf.spawned(), 0);
        let after: Vec<f64> = rrf.uniform(0.0, 1.0).unwrap().take(3).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_callable_mode() {
        let mut rrf = Rrf::default();
        let mut draw = rrf.callable(Uniform::new(10.0, 20.0));
        for _ in 0..50 {
            let value: f64 = draw();
            assert!((10.0..20.0).contains(&value));
        }
    }

    #[test]
    fn test_integers_exclusive_upper_bound() {
        let mut rrf = Rrf::default();
        assert!(rrf.integers(0, 1).unwrap().take(100).all(|value| value == 0));
        assert!(rrf.integers(3, 3).is_err());
    }

    #[test]
    fn test_invalid_distributions_are_rejected() {
        let mut rrf = Rrf::default();
        assert!(matches!(rrf.normal(0.0, -1.0), Err(Error::Distribution(_))));
        assert!(rrf.uniform(2.0, 1.0).is_err());
        assert!(rrf.multivariate_normal(vec![0.0, 0.0], vec![vec![1.0, 0.0]]).is_err());
        assert!(rrf
            .multivariate_normal(vec![0.0, 0.0], vec![vec![-1.0, 0.0], vec![0.0, 1.0]])
            .is_err());
        // failed constructions do not consume a stream
        assert_eq!(rrf.spawned(), 0);
    }

    #[test]
    fn test_degenerate_uniform_is_constant() {
        let mut rrf = Rrf::default();
        assert!(rrf.uniform(0.5, 0.5).unwrap().take(10).all(|value| value == 0.5));
    }

    #[test]
    fn test_multivariate_normal_moments() {
        let mut rrf = Rrf::default();
        let samples: Vec<Vec<f64>> = rrf
            .multivariate_normal(vec![2.5, 1.25], vec![vec![0.0225, 0.0], vec![0.0, 0.04]])
            .unwrap()
            .take(4000)
            .collect();

        let mean0 = samples.iter().map(|s| s[0]).sum::<f64>() / samples.len() as f64;
        let mean1 = samples.iter().map(|s| s[1]).sum::<f64>() / samples.len() as f64;
        assert!((mean0 - 2.5).abs() < 0.02);
        assert!((mean1 - 1.25).abs() < 0.02);

        let var1 = samples.iter().map(|s| (s[1] - mean1).powi(2)).sum::<f64>()
            / samples.len() as f64;
        assert!((var1 - 0.04).abs() < 0.006);
    }

    #[test]
    fn test_enforce_bounds_filters_in_order() {
        let values = vec![-1.0, 0.5, 2.0, 0.7];
        let kept: Vec<f64> = enforce_bounds(values.into_iter(), 0.0, 1.0).collect();
        assert_eq!(kept, vec![0.5, 0.7]);
    }

    #[test]
    fn test_enforce_bounds_open_interval() {
        let kept: Vec<f64> = enforce_bounds(vec![0.0, 1.0, 0.25].into_iter(), 0.0, 1.0).collect();
        assert_eq!(kept, vec![0.25]);
    }

    #[test]
    fn test_enforce_bounds_arrays_require_all_elements() {
        let arrays = vec![[0.5, 1.5], [0.2, 0.3], [-0.1, 0.4]];
        let kept: Vec<[f64; 2]> = enforce_bounds(arrays.into_iter(), 0.0, 1.0).collect();
        assert_eq!(kept, vec![[0.2, 0.3]]);
    }

    #[test]
    fn test_wrap_and_compose() {
        let doubled: Vec<i32> = wrap(vec![1, 2, 3].into_iter(), |x| x * 2).collect();
        assert_eq!(doubled, vec![2, 4, 6]);

        let sums: Vec<i32> = compose(
            |(a, b)| a + b,
            (vec![1, 2, 3].into_iter(), vec![10, 20].into_iter()),
        )
        .collect();
        assert_eq!(sums, vec![11, 22]);
    }

    #[test]
    fn test_chain_rejection_sampling() {
        let mut rrf = Rrf::default();
        let mut lengths = rrf.uniform(0.0, 2.0).unwrap();
        let mut widths = rrf.uniform(0.0, 2.0).unwrap();

        let accepted: Vec<(f64, f64)> = chain(move || {
            let (length, width) = (lengths.next()?, widths.next()?);
            (length > width).then_some((length, width))
        })
        .take(100)
        .collect();

        assert_eq!(accepted.len(), 100);
        assert!(accepted.iter().all(|(length, width)| length > width));
    }

    #[test]
    fn test_chain_flattens_every_round() {
        let mut round = 0;
        let values: Vec<i32> = chain(|| {
            round += 1;
            vec![round; 2]
        })
        .take(5)
        .collect();
        assert_eq!(values, vec![1, 1, 2, 2, 3]);
    }

    proptest! {
        #[test]
        fn prop_enforce_bounds_is_ordered_subsequence(
            values in proptest::collection::vec(-10.0f64..10.0, 0..50),
            minimum in -5.0f64..0.0,
            maximum in 0.0f64..5.0,
        ) {
            let kept: Vec<f64> = enforce_bounds(values.clone().into_iter(), minimum, maximum).collect();
            let expected: Vec<f64> = values
                .into_iter()
                .filter(|value| *value > minimum && *value < maximum)
                .collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn prop_seeded_streams_reproduce(seed in any::<u64>()) {
            let mut first = Rrf::new(seed, RngKind::ChaCha8);
            let mut second = Rrf::new(seed, RngKind::ChaCha8);
            let a: Vec<f64> = first.uniform(0.0, 1.0).unwrap().take(8).collect();
            let b: Vec<f64> = second.uniform(0.0, 1.0).unwrap().take(8).collect();
            prop_assert_eq!(a, b);
        }
    }
}
