//! Nodes injecting Gaussian noise.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, seeded_rng};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::ArrayViewMut1;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Normal, StandardNormal};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GaussianNoiseParams {
    alias: String,
    input_alias: String,
    noise_std: f64,
    #[serde(default)]
    seed: Option<u64>,
}

/// Adds independent `N(0, noise_std)` noise to every value.
#[derive(Debug)]
pub struct GaussianNoise {
    base: NodeBase,
    noise: Normal<f64>,
    rng: StdRng,
}

impl GaussianNoise {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        noise_std: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let alias = alias.into();
        if !(noise_std.is_finite() && noise_std >= 0.0) {
            return Err(SimError::value(format!(
                "GaussianNoise node {}: noise_std must be finite and non-negative, got {}",
                alias, noise_std
            )));
        }
        let noise = Normal::new(0.0, noise_std).map_err(|err| {
            SimError::value(format!("GaussianNoise node {}: noise_std {}: {}", alias, noise_std, err))
        })?;
        Ok(Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            noise,
            rng: seeded_rng(seed),
        })
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: GaussianNoiseParams = parse_params("GaussianNoise", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.noise_std,
            p.seed,
        )?))
    }
}

impl NodeInfo for GaussianNoise {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for GaussianNoise {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (noise, rng) = (&self.noise, &mut self.rng);
        Ok(input.mapv(|x| x + rng.sample::<f64, _>(noise)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeritabilityParams {
    alias: String,
    input_alias: String,
    heritability: f64,
    #[serde(default)]
    seed: Option<u64>,
}

/// Mixes standardized input with standard normal noise so that a fraction
/// `heritability` of the output variance comes from the input:
///
/// ```text
/// output = sqrt(h2) * (x - mean(x)) / std(x) + sqrt(1 - h2) * N(0, 1)
/// ```
///
/// Vectors are standardized as a whole and matrices row by row. A constant
/// row contributes a zero signal term.
#[derive(Debug)]
pub struct Heritability {
    base: NodeBase,
    heritability: f64,
    rng: StdRng,
}

impl Heritability {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        heritability: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let alias = alias.into();
        if !(0.0..=1.0).contains(&heritability) {
            return Err(SimError::value(format!(
                "Heritability node {}: heritability must be in [0, 1], got {}",
                alias, heritability
            )));
        }
        Ok(Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            heritability,
            rng: seeded_rng(seed),
        })
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: HeritabilityParams = parse_params("Heritability", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.heritability,
            p.seed,
        )?))
    }

    fn mix_row(&mut self, mut row: ArrayViewMut1<'_, f64>) {
        if row.is_empty() {
            return;
        }
        let n = row.len() as f64;
        let mean = row.sum() / n;
        let std = (row.fold(0.0, |acc, &v| acc + (v - mean).powi(2)) / n).sqrt();
        let signal_weight = self.heritability.sqrt();
        let noise_weight = (1.0 - self.heritability).sqrt();
        let rng = &mut self.rng;
        row.mapv_inplace(|v| {
            let signal = if std == 0.0 { 0.0 } else { (v - mean) / std };
            let noise: f64 = rng.sample(StandardNormal);
            signal_weight * signal + noise_weight * noise
        });
    }
}

impl NodeInfo for Heritability {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Heritability {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let mut data = input.as_matrix().to_owned();
        for row in data.rows_mut() {
            self.mix_row(row);
        }
        Ok(input.with_shape_of(data))
    }
}
