// Random sampling functions
//
// RandBinomial, RandUniform and RandNormal share one implementation,
// `RandomFunction<S, T>`: zero inputs, one output of a fixed shape, filled with
// draws from the sampler `S` and converted to the element type `T`.
//
// Each instance owns a `RandomState`. With recompute enabled (the default, or
// switched on by `setup_recompute`) every forward snapshots the generator
// first, so `recompute` regenerates the last forward's output bit for bit. Outputs carry no gradient and backward
// propagates nothing.
//
// SEEDS:
//
//   Some(s), s >= 0  — deterministic: two instances with the same arguments
//                      produce the same sequence of outputs
//   None or negative — seed drawn from the process seed source at construction

use std::marker::PhantomData;

use log::debug;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};
use wren_core::{Context, DType, Error, Result, Shape, Variable, WithDType};

use crate::args::Arg;
use crate::function::Function;
use crate::random::RandomState;

/// Distribution parameters of a random function.
pub trait Sampler: Clone + Send + 'static {
    const NAME: &'static str;

    /// Distribution arguments, in signature order.
    fn args(&self) -> Vec<Arg>;

    fn sample(&self, rng: &mut StdRng) -> f64;
}

/// Binomial(n, p): number of successes in `n` trials of probability `p`.
#[derive(Debug, Clone)]
pub struct BinomialSampler {
    n: i64,
    p: f64,
    dist: rand_distr::Binomial,
}

impl BinomialSampler {
    pub fn new(n: i64, p: f64) -> Result<Self> {
        if n <= 0 {
            return Err(Error::invalid_argument(
                "RandBinomial",
                format!("n must be greater than 0, got {n}"),
            ));
        }
        if !(p > 0.0 && p < 1.0) {
            return Err(Error::invalid_argument(
                "RandBinomial",
                format!("p must be between 0 and 1 (exclusive), got {p}"),
            ));
        }
        let dist = rand_distr::Binomial::new(n as u64, p)
            .map_err(|e| Error::invalid_argument("RandBinomial", e.to_string()))?;
        Ok(BinomialSampler { n, p, dist })
    }
}

impl Sampler for BinomialSampler {
    const NAME: &'static str = "RandBinomial";

    fn args(&self) -> Vec<Arg> {
        vec![Arg::Int(self.n), Arg::Float(self.p)]
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        self.dist.sample(rng) as f64
    }
}

/// Uniform on `[low, high)`.
#[derive(Debug, Clone)]
pub struct UniformSampler {
    low: f64,
    high: f64,
    dist: Uniform<f64>,
}

impl UniformSampler {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(low < high) || !low.is_finite() || !high.is_finite() {
            return Err(Error::invalid_argument(
                "RandUniform",
                format!("need finite low < high, got low={low} high={high}"),
            ));
        }
        Ok(UniformSampler {
            low,
            high,
            dist: Uniform::new(low, high),
        })
    }
}

impl Sampler for UniformSampler {
    const NAME: &'static str = "RandUniform";

    fn args(&self) -> Vec<Arg> {
        vec![Arg::Float(self.low), Arg::Float(self.high)]
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        self.dist.sample(rng)
    }
}

/// Normal with mean `mu` and standard deviation `sigma`.
#[derive(Debug, Clone)]
pub struct NormalSampler {
    mu: f64,
    sigma: f64,
    dist: Normal<f64>,
}

impl NormalSampler {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(Error::invalid_argument(
                "RandNormal",
                format!("sigma must be greater than 0, got {sigma}"),
            ));
        }
        let dist = Normal::new(mu, sigma)
            .map_err(|e| Error::invalid_argument("RandNormal", e.to_string()))?;
        Ok(NormalSampler { mu, sigma, dist })
    }
}

impl Sampler for NormalSampler {
    const NAME: &'static str = "RandNormal";

    fn args(&self) -> Vec<Arg> {
        vec![Arg::Float(self.mu), Arg::Float(self.sigma)]
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        self.dist.sample(rng)
    }
}

/// A zero-input function filling its output with draws from `S`.
pub struct RandomFunction<S: Sampler, T: WithDType> {
    ctx: Context,
    sampler: S,
    dims: Vec<i64>,
    shape: Shape,
    /// The seed argument as given; `None` when unseeded.
    seed_arg: Option<i64>,
    state: RandomState,
    recompute: bool,
    _marker: PhantomData<T>,
}

/// Binomial samples; arguments `(n, p, shape, seed)`.
pub type RandBinomial<T> = RandomFunction<BinomialSampler, T>;
/// Uniform samples; arguments `(low, high, shape, seed)`.
pub type RandUniform<T> = RandomFunction<UniformSampler, T>;
/// Normal samples; arguments `(mu, sigma, shape, seed)`.
pub type RandNormal<T> = RandomFunction<NormalSampler, T>;

impl<T: WithDType> RandomFunction<BinomialSampler, T> {
    pub fn new(ctx: Context, n: i64, p: f64, shape: Vec<i64>, seed: Option<i64>) -> Result<Self> {
        Self::with_sampler(ctx, BinomialSampler::new(n, p)?, shape, seed)
    }
}

impl<T: WithDType> RandomFunction<UniformSampler, T> {
    pub fn new(ctx: Context, low: f64, high: f64, shape: Vec<i64>, seed: Option<i64>) -> Result<Self> {
        Self::with_sampler(ctx, UniformSampler::new(low, high)?, shape, seed)
    }
}

impl<T: WithDType> RandomFunction<NormalSampler, T> {
    pub fn new(ctx: Context, mu: f64, sigma: f64, shape: Vec<i64>, seed: Option<i64>) -> Result<Self> {
        Self::with_sampler(ctx, NormalSampler::new(mu, sigma)?, shape, seed)
    }
}

impl<S: Sampler, T: WithDType> RandomFunction<S, T> {
    pub fn with_sampler(ctx: Context, sampler: S, dims: Vec<i64>, seed: Option<i64>) -> Result<Self> {
        let shape = Shape::from_i64_dims(&dims)
            .map_err(|e| Error::invalid_argument(S::NAME, e.to_string()))?;
        let explicit = seed.and_then(|s| u64::try_from(s).ok());
        let state = RandomState::new(explicit);
        debug!("{}: shape {shape}, seed {}", S::NAME, state.seed());
        Ok(RandomFunction {
            ctx,
            sampler,
            dims,
            shape,
            seed_arg: seed,
            state,
            recompute: true,
            _marker: PhantomData,
        })
    }

    /// Enable or disable snapshotting for recompute. Enabled by default.
    pub fn with_recompute(mut self, recompute: bool) -> Self {
        self.recompute = recompute;
        self
    }

    /// The resolved seed of this instance.
    pub fn seed(&self) -> u64 {
        self.state.seed()
    }

    fn not_ready(reason: &str) -> Error {
        Error::RecomputeNotReady {
            function: S::NAME.to_string(),
            output: 0,
            reason: reason.to_string(),
        }
    }
}

fn draw<S: Sampler, T: WithDType>(sampler: &S, rng: &mut StdRng, out: &Variable) -> Result<()> {
    let mut y = out.data_mut();
    for v in y.as_mut_slice::<T>()?.iter_mut() {
        *v = T::from_f64(sampler.sample(rng));
    }
    Ok(())
}

impl<S: Sampler, T: WithDType> Function for RandomFunction<S, T> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn args(&self) -> Vec<Arg> {
        let mut args = self.sampler.args();
        args.push(Arg::Ints(self.dims.clone()));
        args.push(Arg::OptionalInt(self.seed_arg));
        args
    }

    fn min_inputs(&self) -> usize {
        0
    }

    fn min_outputs(&self) -> usize {
        1
    }

    fn in_types(&self) -> Vec<DType> {
        vec![]
    }

    fn out_types(&self) -> Vec<DType> {
        vec![T::DTYPE]
    }

    fn setup_impl(&mut self, _inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        outputs[0].reshape(self.shape.clone(), T::DTYPE);
        Ok(())
    }

    fn forward_impl(&mut self, _inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let rng = self.state.rng_for_forward(self.recompute);
        draw::<S, T>(&self.sampler, rng, &outputs[0])
    }

    fn backward_impl(
        &mut self,
        _inputs: &[Variable],
        _outputs: &[Variable],
        _propagate_down: &[bool],
        _accum: &[bool],
    ) -> Result<()> {
        Ok(())
    }

    fn grad_depends_output_data(&self, _i: usize, _o: usize) -> bool {
        false
    }

    fn grad_depends_input_data(&self, _i: usize, _j: usize) -> bool {
        false
    }

    fn need_setup_recompute(&self, o: usize) -> bool {
        o == 0 && self.recompute
    }

    /// Turns snapshotting on; valid before the first forward.
    fn setup_recompute_impl(&mut self, _inputs: &[Variable], _outputs: &[Variable]) -> Result<()> {
        self.recompute = true;
        Ok(())
    }

    fn recompute_impl(&mut self, _inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let mut rng = self
            .state
            .rng_for_recompute()
            .ok_or_else(|| Self::not_ready("forward has not run since construction"))?;
        draw::<S, T>(&self.sampler, &mut rng, &outputs[0])
    }

    fn copy(&self) -> Box<dyn Function> {
        Box::new(RandomFunction::<S, T> {
            ctx: self.ctx.clone(),
            sampler: self.sampler.clone(),
            dims: self.dims.clone(),
            shape: self.shape.clone(),
            seed_arg: self.seed_arg,
            state: self.state.restarted(),
            recompute: self.recompute,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_validation() {
        assert!(BinomialSampler::new(0, 0.5).is_err());
        assert!(BinomialSampler::new(10, 0.0).is_err());
        assert!(BinomialSampler::new(10, 1.0).is_err());
        assert!(BinomialSampler::new(10, f64::NAN).is_err());
        assert!(BinomialSampler::new(10, 0.5).is_ok());
    }

    #[test]
    fn test_uniform_and_normal_validation() {
        assert!(UniformSampler::new(1.0, 1.0).is_err());
        assert!(UniformSampler::new(2.0, 1.0).is_err());
        assert!(NormalSampler::new(0.0, 0.0).is_err());
        assert!(NormalSampler::new(0.0, -1.0).is_err());
    }

    #[test]
    fn test_negative_shape_rejected() {
        let r = RandBinomial::<f32>::new(Context::cpu(), 10, 0.5, vec![2, -1], Some(1));
        assert!(matches!(r, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_args_round_trip_declared_seed() {
        let f = RandNormal::<f64>::new(Context::cpu(), 1.0, 2.0, vec![3], None).unwrap();
        assert_eq!(
            f.args(),
            vec![
                Arg::Float(1.0),
                Arg::Float(2.0),
                Arg::Ints(vec![3]),
                Arg::OptionalInt(None)
            ]
        );
    }

    #[test]
    fn test_binomial_samples_in_range() {
        let s = BinomialSampler::new(10, 0.5).unwrap();
        let mut state = RandomState::new(Some(5));
        let rng = state.rng_for_forward(false);
        for _ in 0..100 {
            let v = s.sample(rng);
            assert!((0.0..=10.0).contains(&v) && v.fract() == 0.0);
        }
    }
}
