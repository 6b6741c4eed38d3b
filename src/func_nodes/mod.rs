//! The built-in operator nodes.
//!
//! Every node type has a `from_params` constructor taking the step
//! configuration (minus its `type` key), which is what the
//! [`NodeBuilder`](crate::builder::NodeBuilder) registers.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

pub mod combine;
pub mod conditional;
pub mod constant;
pub mod distribution;
pub mod math;
pub mod noise;
pub mod reduce;
pub mod scaling;
pub mod transform;
pub mod util;

pub use combine::{AdditiveCombine, MaxCombine, MeanCombine, MinCombine};
pub use conditional::IfElse;
pub use constant::{Constant, ConstantValue, RandomConstant};
pub use distribution::{Distribution, Sampler};
pub use math::{Identity, Product, Sum};
pub use noise::{GaussianNoise, Heritability};
pub use reduce::{
    AllReduce, AnyReduce, MaxReduce, MeanReduce, MinReduce, ProductReduce, SumReduce,
};
pub use scaling::{Clip, MinMaxScaler, RobustScaler, StandardScaler};
pub use transform::{ReLU, Sigmoid, Softmax, Tanh};
pub use util::Concatenate;

/// Comparison of a value against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(self, x: f64, threshold: f64) -> bool {
        match self {
            Comparison::Ge => x >= threshold,
            Comparison::Le => x <= threshold,
            Comparison::Gt => x > threshold,
            Comparison::Lt => x < threshold,
            Comparison::Eq => x == threshold,
            Comparison::Ne => x != threshold,
        }
    }
}

impl FromStr for Comparison {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ge" => Ok(Comparison::Ge),
            "le" => Ok(Comparison::Le),
            "gt" => Ok(Comparison::Gt),
            "lt" => Ok(Comparison::Lt),
            "eq" => Ok(Comparison::Eq),
            "ne" => Ok(Comparison::Ne),
            other => Err(SimError::value(format!(
                "comparison must be one of 'ge', 'le', 'gt', 'lt', 'eq', or 'ne', got '{}'",
                other
            ))),
        }
    }
}

/// Arithmetic, geometric or harmonic mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeanType {
    Arithmetic,
    Geometric,
    Harmonic,
}

impl MeanType {
    pub fn mean_of<I>(self, values: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let mut n = 0usize;
        let mut acc = 0.0;
        for x in values {
            n += 1;
            acc += match self {
                MeanType::Arithmetic => x,
                MeanType::Geometric => x.ln(),
                MeanType::Harmonic => 1.0 / x,
            };
        }
        let mean = acc / n as f64;
        match self {
            MeanType::Arithmetic => mean,
            MeanType::Geometric => mean.exp(),
            MeanType::Harmonic => 1.0 / mean,
        }
    }
}

impl FromStr for MeanType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "arithmetic" => Ok(MeanType::Arithmetic),
            "geometric" => Ok(MeanType::Geometric),
            "harmonic" => Ok(MeanType::Harmonic),
            other => Err(SimError::value(format!(
                "mean_type {} not supported. Must be 'arithmetic', 'geometric', or 'harmonic'",
                other
            ))),
        }
    }
}

/// Parameters of nodes reading one alias.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SingleInputParams {
    pub alias: String,
    pub input_alias: String,
}

/// Parameters of nodes reading a list of aliases.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ListInputParams {
    pub alias: String,
    pub input_aliases: Vec<String>,
}

pub(crate) fn parse_params<T: DeserializeOwned>(node_type: &str, params: StepParams) -> Result<T> {
    let alias = params
        .get("alias")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_owned();
    serde_json::from_value(Value::Object(params)).map_err(|err| {
        SimError::config(format!(
            "invalid parameters for {} node {}: {}",
            node_type, alias, err
        ))
    })
}

pub(crate) fn default_threshold() -> f64 {
    1.0
}

pub(crate) fn default_comparison() -> String {
    "ge".to_owned()
}

pub(crate) fn default_mean_type() -> String {
    "arithmetic".to_owned()
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
