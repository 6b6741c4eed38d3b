//! Identity and elementwise arithmetic over several inputs.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, ListInputParams, SingleInputParams};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::{broadcast_zip, Values};

/// Returns its input unchanged. Mostly useful for wiring and testing.
#[derive(Debug)]
pub struct Identity {
    base: NodeBase,
}

impl Identity {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("Identity", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for Identity {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Identity {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        args.into_single(self.alias())
    }
}

fn fold_inputs<F>(alias: &str, args: &Args<Values>, f: F) -> Result<Values>
where
    F: Fn(&[f64]) -> f64,
{
    if args.is_empty() {
        return Err(SimError::value(format!("node {} needs at least one input", alias)));
    }
    let inputs: Vec<&Values> = args.values().collect();
    broadcast_zip(&inputs, f)
}

/// Elementwise sum of its inputs.
///
/// Vector inputs are added to every feature row of matrix inputs; matrix
/// inputs must all have the same shape.
#[derive(Debug)]
pub struct Sum {
    base: NodeBase,
}

impl Sum {
    pub fn new(alias: impl Into<String>, input_aliases: Vec<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::List(input_aliases)),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ListInputParams = parse_params("Sum", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_aliases)))
    }
}

impl NodeInfo for Sum {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Sum {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        fold_inputs(self.alias(), &args, |x| x.iter().sum())
    }
}

/// Elementwise product of its inputs, broadcast like [`Sum`].
#[derive(Debug)]
pub struct Product {
    base: NodeBase,
}

impl Product {
    pub fn new(alias: impl Into<String>, input_aliases: Vec<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::List(input_aliases)),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ListInputParams = parse_params("Product", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_aliases)))
    }
}

impl NodeInfo for Product {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Product {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        fold_inputs(self.alias(), &args, |x| x.iter().product())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HaplotypePair, NodeValue};
    use ndarray::{arr1, arr2};
    use pretty_assertions::assert_eq;
    use std::error::Error;

    fn mixed_inputs() -> Vec<Values> {
        vec![
            arr1(&[1.0, 2.0, 3.0]).into(),
            arr2(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).into(),
            arr2(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).into(),
        ]
    }

    #[test]
    fn test_sum() -> Result<(), Box<dyn Error>> {
        let mut node = Sum::new("sum", vec!["a".into(), "b".into()]);
        let out = node.run(Args::positional(vec![
            arr1(&[1.0, 2.0, 3.0]).into(),
            arr1(&[4.0, 5.0, 6.0]).into(),
        ]))?;
        assert_eq!(out, arr1(&[5.0, 7.0, 9.0]).into());

        let out = node.run(Args::positional(mixed_inputs()))?;
        assert_eq!(out, arr2(&[[3.0, 4.0, 5.0], [5.0, 6.0, 7.0]]).into());
        Ok(())
    }

    #[test]
    fn test_product() -> Result<(), Box<dyn Error>> {
        let mut node = Product::new("prod", vec![]);
        let out = node.run(Args::positional(vec![
            arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into(),
            arr2(&[[7.0, 8.0, 9.0], [10.0, 11.0, 12.0]]).into(),
        ]))?;
        assert_eq!(out, arr2(&[[7.0, 16.0, 27.0], [40.0, 55.0, 72.0]]).into());

        let out = node.run(Args::positional(mixed_inputs()))?;
        assert_eq!(out, arr2(&[[1.0, 2.0, 3.0], [4.0, 8.0, 12.0]]).into());
        Ok(())
    }

    #[test]
    fn test_sum_without_inputs_fails() {
        assert!(Sum::new("sum", vec![]).run(Args::none()).is_err());
    }

    #[test]
    fn test_identity_keeps_haplotypes() -> Result<(), Box<dyn Error>> {
        let pair = HaplotypePair::new(arr1(&[1.0, 2.0]).into(), arr1(&[3.0, 4.0]).into())?;
        let mut node = Node::function(Identity::new("id", "hap"));
        assert_eq!(
            node.invoke(Args::single(pair.clone().into()))?,
            NodeValue::Haplotype(pair)
        );
        Ok(())
    }
}
