//! Non-linear transforms.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, SingleInputParams};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::Axis;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReLUParams {
    alias: String,
    input_alias: String,
    #[serde(default)]
    neg_slope: f64,
    #[serde(default)]
    threshold: f64,
}

/// Leaky ReLU: values above `threshold` pass through, all others are
/// multiplied by `neg_slope`.
#[derive(Debug)]
pub struct ReLU {
    base: NodeBase,
    neg_slope: f64,
    threshold: f64,
}

impl ReLU {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        neg_slope: f64,
        threshold: f64,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            neg_slope,
            threshold,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ReLUParams = parse_params("ReLU", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.neg_slope,
            p.threshold,
        )))
    }
}

impl NodeInfo for ReLU {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for ReLU {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (neg_slope, threshold) = (self.neg_slope, self.threshold);
        Ok(input.mapv(|x| if x > threshold { x } else { x * neg_slope }))
    }
}

#[derive(Debug)]
pub struct Sigmoid {
    base: NodeBase,
}

impl Sigmoid {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("Sigmoid", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for Sigmoid {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Sigmoid {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(input.mapv(|x| 1.0 / (1.0 + (-x).exp())))
    }
}

/// Softmax over each sample's feature values, so every sample's column sums
/// to 1. Needs a matrix input.
#[derive(Debug)]
pub struct Softmax {
    base: NodeBase,
}

impl Softmax {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("Softmax", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for Softmax {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Softmax {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let m = match &input {
            Values::Matrix(m) => m,
            Values::Vector(_) => {
                return Err(SimError::value(format!(
                    "input to Softmax node {} must be a matrix (multiple values per sample)",
                    self.alias()
                )))
            }
        };
        let exp = m.mapv(f64::exp);
        let totals = exp.sum_axis(Axis(0));
        Ok(Values::Matrix(exp / &totals))
    }
}

#[derive(Debug)]
pub struct Tanh {
    base: NodeBase,
}

impl Tanh {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("Tanh", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for Tanh {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Tanh {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(input.mapv(f64::tanh))
    }
}
