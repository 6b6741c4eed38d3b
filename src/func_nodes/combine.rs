//! Nodes combining the two haplotype copies into one value per sample.
use crate::builder::StepParams;
use crate::error::Result;
use crate::func_nodes::{default_mean_type, parse_params, MeanType, SingleInputParams};
use crate::node::{Args, CombineNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::{broadcast_zip, HaplotypePair, Values};
use serde::Deserialize;

fn combine_copies<F>(alias: &str, args: Args<HaplotypePair>, f: F) -> Result<Values>
where
    F: Fn(f64, f64) -> f64,
{
    let pair = args.into_single(alias)?;
    broadcast_zip(&[pair.a(), pair.b()], |x| f(x[0], x[1]))
}

/// Elementwise sum of the two copies, e.g. an allele dosage.
#[derive(Debug)]
pub struct AdditiveCombine {
    base: NodeBase,
}

impl AdditiveCombine {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("AdditiveCombine", params)?;
        Ok(Node::combine(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for AdditiveCombine {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl CombineNode for AdditiveCombine {
    fn combine(&mut self, args: Args<HaplotypePair>) -> Result<Values> {
        combine_copies(self.alias(), args, |a, b| a + b)
    }
}

/// Elementwise maximum of the two copies.
#[derive(Debug)]
pub struct MaxCombine {
    base: NodeBase,
}

impl MaxCombine {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("MaxCombine", params)?;
        Ok(Node::combine(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for MaxCombine {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl CombineNode for MaxCombine {
    fn combine(&mut self, args: Args<HaplotypePair>) -> Result<Values> {
        combine_copies(self.alias(), args, f64::max)
    }
}

/// Elementwise minimum of the two copies.
#[derive(Debug)]
pub struct MinCombine {
    base: NodeBase,
}

impl MinCombine {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("MinCombine", params)?;
        Ok(Node::combine(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for MinCombine {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl CombineNode for MinCombine {
    fn combine(&mut self, args: Args<HaplotypePair>) -> Result<Values> {
        combine_copies(self.alias(), args, f64::min)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeanCombineParams {
    alias: String,
    input_alias: String,
    #[serde(default = "default_mean_type")]
    mean_type: String,
}

/// Elementwise arithmetic, geometric or harmonic mean of the two copies.
#[derive(Debug)]
pub struct MeanCombine {
    base: NodeBase,
    mean_type: MeanType,
}

impl MeanCombine {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>, mean_type: MeanType) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            mean_type,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: MeanCombineParams = parse_params("MeanCombine", params)?;
        Ok(Node::combine(Self::new(
            p.alias,
            p.input_alias,
            p.mean_type.parse()?,
        )))
    }
}

impl NodeInfo for MeanCombine {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl CombineNode for MeanCombine {
    fn combine(&mut self, args: Args<HaplotypePair>) -> Result<Values> {
        let mean_type = self.mean_type;
        combine_copies(self.alias(), args, |a, b| mean_type.mean_of([a, b]))
    }
}
