//! Nodes reshaping values without changing them.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, ListInputParams};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::{concatenate, ArrayView2, Axis};

/// Stacks its inputs vertically into one multi-feature matrix, in input
/// order. Vectors become single rows.
#[derive(Debug)]
pub struct Concatenate {
    base: NodeBase,
}

impl Concatenate {
    pub fn new(alias: impl Into<String>, input_aliases: Vec<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::List(input_aliases)),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ListInputParams = parse_params("Concatenate", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_aliases)))
    }
}

impl NodeInfo for Concatenate {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Concatenate {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let views: Vec<ArrayView2<'_, f64>> = args.values().map(Values::as_matrix).collect();
        if views.is_empty() {
            return Err(SimError::value(format!(
                "node {} needs at least one input",
                self.alias()
            )));
        }
        let stacked = concatenate(Axis(0), &views).map_err(|err| {
            SimError::value(format!(
                "node {} cannot concatenate inputs: {}",
                self.alias(),
                err
            ))
        })?;
        Ok(Values::Matrix(stacked))
    }
}
