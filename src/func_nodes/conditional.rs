//! Elementwise selection between two inputs.
use crate::builder::StepParams;
use crate::error::Result;
use crate::func_nodes::{default_comparison, default_threshold, parse_params, Comparison};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::{broadcast_zip, Values};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IfElseParams {
    alias: String,
    input_cond_vals: String,
    input_if_vals: String,
    input_else_vals: String,
    #[serde(default = "default_threshold")]
    threshold: f64,
    #[serde(default = "default_comparison")]
    comparison: String,
}

/// Takes `if_vals` where `cond_vals` passes the threshold comparison and
/// `else_vals` elsewhere.
///
/// The three inputs are passed as the named arguments `cond_vals`, `if_vals`
/// and `else_vals`, and broadcast together like [`Sum`](super::Sum).
#[derive(Debug)]
pub struct IfElse {
    base: NodeBase,
    threshold: f64,
    comparison: Comparison,
}

impl IfElse {
    pub fn new(
        alias: impl Into<String>,
        input_cond_vals: impl Into<String>,
        input_if_vals: impl Into<String>,
        input_else_vals: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
    ) -> Self {
        let mut inputs = BTreeMap::new();
        inputs.insert("cond_vals".to_owned(), input_cond_vals.into());
        inputs.insert("if_vals".to_owned(), input_if_vals.into());
        inputs.insert("else_vals".to_owned(), input_else_vals.into());
        Self {
            base: NodeBase::new(alias, NodeInputs::Named(inputs)),
            threshold,
            comparison,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: IfElseParams = parse_params("IfElse", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_cond_vals,
            p.input_if_vals,
            p.input_else_vals,
            p.threshold,
            p.comparison.parse()?,
        )))
    }
}

impl NodeInfo for IfElse {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for IfElse {
    fn run(&mut self, mut args: Args<Values>) -> Result<Values> {
        let cond = args.take_named("cond_vals", self.alias())?;
        let if_vals = args.take_named("if_vals", self.alias())?;
        let else_vals = args.take_named("else_vals", self.alias())?;
        let (threshold, comparison) = (self.threshold, self.comparison);
        broadcast_zip(&[&cond, &if_vals, &else_vals], |x| {
            if comparison.holds(x[0], threshold) {
                x[1]
            } else {
                x[2]
            }
        })
    }
}
