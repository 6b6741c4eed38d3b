//! Named random distributions and the node drawing fresh values from them.
//!
//! A step names its distribution and keyword parameters, e.g.
//! `{"dist_name": "normal", "dist_kwargs": {"loc": 0, "scale": 2}}`.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, seeded_rng};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::Distribution as _;
use rand_distr::{
    Beta, Binomial, ChiSquared, Exp, Gamma, Geometric, LogNormal, Normal, Poisson, StandardNormal,
    StudentT, Uniform,
};
use serde::Deserialize;
use serde_json::{Map, Value};

const SUPPORTED: &str = "uniform, normal, standard_normal, lognormal, exponential, gamma, beta, \
                         chisquare, standard_t, binomial, poisson, geometric, integers";

/// A distribution picked by name, ready to sample scalars.
#[derive(Debug, Clone)]
pub enum Sampler {
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    StandardNormal,
    LogNormal(LogNormal<f64>),
    Exponential(Exp<f64>),
    Gamma(Gamma<f64>),
    Beta(Beta<f64>),
    ChiSquare(ChiSquared<f64>),
    StandardT(StudentT<f64>),
    Binomial(Binomial),
    Poisson(Poisson<f64>),
    /// Always 0, e.g. a Poisson distribution with `lam = 0`.
    Zero,
    /// Counts trials up to and including the first success.
    Geometric(Geometric),
    /// Integers in `[low, high)`.
    Integers(Uniform<i64>),
}

struct Kwargs<'a> {
    dist: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Kwargs<'a> {
    fn new(dist: &'a str, map: &'a Map<String, Value>, allowed: &[&str]) -> Result<Self> {
        if let Some(unknown) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(SimError::value(format!(
                "distribution {} got unexpected parameter {}; accepted parameters: [{}]",
                dist,
                unknown,
                allowed.join(", ")
            )));
        }
        Ok(Self { dist, map })
    }

    fn float(&self, name: &str, default: Option<f64>) -> Result<f64> {
        match self.map.get(name) {
            Some(v) => v.as_f64().ok_or_else(|| {
                SimError::value(format!(
                    "distribution {} parameter {} must be a number, got {}",
                    self.dist, name, v
                ))
            }),
            None => default.ok_or_else(|| {
                SimError::value(format!(
                    "distribution {} requires parameter {}",
                    self.dist, name
                ))
            }),
        }
    }

    /// A scale-like parameter, which must be finite and non-negative.
    fn spread(&self, name: &str, default: Option<f64>) -> Result<f64> {
        let value = self.float(name, default)?;
        if !(value.is_finite() && value >= 0.0) {
            return Err(self.invalid(format!(
                "{} must be finite and non-negative, got {}",
                name, value
            )));
        }
        Ok(value)
    }

    fn int(&self, name: &str) -> Result<Option<i64>> {
        match self.map.get(name) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                SimError::value(format!(
                    "distribution {} parameter {} must be an integer, got {}",
                    self.dist, name, v
                ))
            }),
        }
    }

    fn invalid(&self, err: impl std::fmt::Display) -> SimError {
        SimError::value(format!("invalid parameters for distribution {}: {}", self.dist, err))
    }
}

impl Sampler {
    pub fn from_name(name: &str, kwargs: &Map<String, Value>) -> Result<Self> {
        let sampler = match name {
            "uniform" => {
                let k = Kwargs::new(name, kwargs, &["low", "high"])?;
                let low = k.float("low", Some(0.0))?;
                let high = k.float("high", Some(1.0))?;
                if !(low < high) || !low.is_finite() || !high.is_finite() {
                    return Err(k.invalid(format!("need finite low < high, got [{}, {})", low, high)));
                }
                Sampler::Uniform(Uniform::new(low, high))
            }
            "normal" => {
                let k = Kwargs::new(name, kwargs, &["loc", "scale"])?;
                let loc = k.float("loc", Some(0.0))?;
                let scale = k.spread("scale", Some(1.0))?;
                Sampler::Normal(Normal::new(loc, scale).map_err(|e| k.invalid(e))?)
            }
            "standard_normal" => {
                Kwargs::new(name, kwargs, &[])?;
                Sampler::StandardNormal
            }
            "lognormal" => {
                let k = Kwargs::new(name, kwargs, &["mean", "sigma"])?;
                let mean = k.float("mean", Some(0.0))?;
                let sigma = k.spread("sigma", Some(1.0))?;
                Sampler::LogNormal(LogNormal::new(mean, sigma).map_err(|e| k.invalid(e))?)
            }
            "exponential" => {
                let k = Kwargs::new(name, kwargs, &["scale"])?;
                let scale = k.float("scale", Some(1.0))?;
                if !(scale > 0.0) {
                    return Err(k.invalid(format!("scale must be positive, got {}", scale)));
                }
                Sampler::Exponential(Exp::new(1.0 / scale).map_err(|e| k.invalid(e))?)
            }
            "gamma" => {
                let k = Kwargs::new(name, kwargs, &["shape", "scale"])?;
                let shape = k.float("shape", None)?;
                let scale = k.float("scale", Some(1.0))?;
                Sampler::Gamma(Gamma::new(shape, scale).map_err(|e| k.invalid(e))?)
            }
            "beta" => {
                let k = Kwargs::new(name, kwargs, &["a", "b"])?;
                let a = k.float("a", None)?;
                let b = k.float("b", None)?;
                Sampler::Beta(Beta::new(a, b).map_err(|e| k.invalid(e))?)
            }
            "chisquare" => {
                let k = Kwargs::new(name, kwargs, &["df"])?;
                let df = k.float("df", None)?;
                Sampler::ChiSquare(ChiSquared::new(df).map_err(|e| k.invalid(e))?)
            }
            "standard_t" => {
                let k = Kwargs::new(name, kwargs, &["df"])?;
                let df = k.float("df", None)?;
                Sampler::StandardT(StudentT::new(df).map_err(|e| k.invalid(e))?)
            }
            "binomial" => {
                let k = Kwargs::new(name, kwargs, &["n", "p"])?;
                let n = k
                    .int("n")?
                    .ok_or_else(|| k.invalid("parameter n is required"))?;
                let n = u64::try_from(n).map_err(|_| k.invalid("n must be non-negative"))?;
                let p = k.float("p", None)?;
                Sampler::Binomial(Binomial::new(n, p).map_err(|e| k.invalid(e))?)
            }
            "poisson" => {
                let k = Kwargs::new(name, kwargs, &["lam"])?;
                let lam = k.spread("lam", Some(1.0))?;
                if lam == 0.0 {
                    Sampler::Zero
                } else {
                    Sampler::Poisson(Poisson::new(lam).map_err(|e| k.invalid(e))?)
                }
            }
            "geometric" => {
                let k = Kwargs::new(name, kwargs, &["p"])?;
                let p = k.float("p", None)?;
                if p == 0.0 {
                    return Err(k.invalid("p must be greater than 0"));
                }
                Sampler::Geometric(Geometric::new(p).map_err(|e| k.invalid(e))?)
            }
            "integers" => {
                let k = Kwargs::new(name, kwargs, &["low", "high"])?;
                let low = k
                    .int("low")?
                    .ok_or_else(|| k.invalid("parameter low is required"))?;
                // A lone bound is the exclusive upper bound.
                let (low, high) = match k.int("high")? {
                    Some(high) => (low, high),
                    None => (0, low),
                };
                if low >= high {
                    return Err(k.invalid(format!("need low < high, got [{}, {})", low, high)));
                }
                Sampler::Integers(Uniform::new(low, high))
            }
            other => {
                return Err(SimError::value(format!(
                    "unknown distribution {}; supported distributions: {}",
                    other, SUPPORTED
                )))
            }
        };
        Ok(sampler)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Normal(d) => d.sample(rng),
            Sampler::StandardNormal => StandardNormal.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
            Sampler::Beta(d) => d.sample(rng),
            Sampler::ChiSquare(d) => d.sample(rng),
            Sampler::StandardT(d) => d.sample(rng),
            Sampler::Binomial(d) => d.sample(rng) as f64,
            Sampler::Poisson(d) => d.sample(rng),
            Sampler::Zero => 0.0,
            Sampler::Geometric(d) => (d.sample(rng) + 1) as f64,
            Sampler::Integers(d) => d.sample(rng) as f64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DistributionParams {
    alias: String,
    input_match_size: String,
    dist_name: String,
    #[serde(default)]
    dist_kwargs: Map<String, Value>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Draws new values shaped like its input on every call. Nothing is cached;
/// see [`RandomConstant`](super::RandomConstant) for a value drawn once.
#[derive(Debug)]
pub struct Distribution {
    base: NodeBase,
    sampler: Sampler,
    rng: StdRng,
}

impl Distribution {
    pub fn new(
        alias: impl Into<String>,
        input_match_size: impl Into<String>,
        sampler: Sampler,
        seed: Option<u64>,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_match_size.into())),
            sampler,
            rng: seeded_rng(seed),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: DistributionParams = parse_params("Distribution", params)?;
        let sampler = Sampler::from_name(&p.dist_name, &p.dist_kwargs)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_match_size,
            sampler,
            p.seed,
        )))
    }
}

impl NodeInfo for Distribution {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Distribution {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (sampler, rng) = (&self.sampler, &mut self.rng);
        Ok(input.mapv(|_| sampler.sample(rng)))
    }
}
