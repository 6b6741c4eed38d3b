//! Reduce each sample's feature values to one value per sample.
//!
//! Inputs have shape `(n_features, n_samples)` and outputs `(n_samples,)`.
//! A vector input is treated as a single feature row.
use crate::builder::StepParams;
use crate::error::Result;
use crate::func_nodes::{
    default_comparison, default_mean_type, default_threshold, parse_params, Comparison, MeanType,
    SingleInputParams,
};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::{ArrayView1, Axis};
use serde::Deserialize;

fn reduce_features<F>(input: &Values, f: F) -> Values
where
    F: FnMut(ArrayView1<'_, f64>) -> f64,
{
    Values::Vector(input.as_matrix().map_axis(Axis(0), f))
}

/// Sum of each sample's feature values.
#[derive(Debug)]
pub struct SumReduce {
    base: NodeBase,
}

impl SumReduce {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("SumReduce", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for SumReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for SumReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(reduce_features(&input, |col| col.sum()))
    }
}

/// Product of each sample's feature values.
#[derive(Debug)]
pub struct ProductReduce {
    base: NodeBase,
}

impl ProductReduce {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("ProductReduce", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for ProductReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for ProductReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(reduce_features(&input, |col| col.product()))
    }
}

/// Minimum of each sample's feature values.
#[derive(Debug)]
pub struct MinReduce {
    base: NodeBase,
}

impl MinReduce {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("MinReduce", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for MinReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for MinReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(reduce_features(&input, |col| {
            col.fold(f64::INFINITY, |acc, &x| acc.min(x))
        }))
    }
}

/// Maximum of each sample's feature values.
#[derive(Debug)]
pub struct MaxReduce {
    base: NodeBase,
}

impl MaxReduce {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: SingleInputParams = parse_params("MaxReduce", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias)))
    }
}

impl NodeInfo for MaxReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for MaxReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(reduce_features(&input, |col| {
            col.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x))
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeanReduceParams {
    alias: String,
    input_alias: String,
    #[serde(default = "default_mean_type")]
    mean_type: String,
}

/// Arithmetic, geometric or harmonic mean of each sample's feature values.
#[derive(Debug)]
pub struct MeanReduce {
    base: NodeBase,
    mean_type: MeanType,
}

impl MeanReduce {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>, mean_type: MeanType) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            mean_type,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: MeanReduceParams = parse_params("MeanReduce", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.mean_type.parse()?,
        )))
    }
}

impl NodeInfo for MeanReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for MeanReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let mean_type = self.mean_type;
        Ok(reduce_features(&input, |col| {
            mean_type.mean_of(col.iter().copied())
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdReduceParams {
    alias: String,
    input_alias: String,
    #[serde(default = "default_threshold")]
    threshold: f64,
    #[serde(default = "default_comparison")]
    comparison: String,
}

/// 1 for samples where any feature passes the threshold comparison, else 0.
#[derive(Debug)]
pub struct AnyReduce {
    base: NodeBase,
    threshold: f64,
    comparison: Comparison,
}

impl AnyReduce {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            threshold,
            comparison,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ThresholdReduceParams = parse_params("AnyReduce", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.threshold,
            p.comparison.parse()?,
        )))
    }
}

impl NodeInfo for AnyReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for AnyReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (threshold, comparison) = (self.threshold, self.comparison);
        Ok(reduce_features(&input, |col| {
            if col.iter().any(|&x| comparison.holds(x, threshold)) {
                1.0
            } else {
                0.0
            }
        }))
    }
}

/// 1 for samples where every feature passes the threshold comparison, else 0.
#[derive(Debug)]
pub struct AllReduce {
    base: NodeBase,
    threshold: f64,
    comparison: Comparison,
}

impl AllReduce {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            threshold,
            comparison,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ThresholdReduceParams = parse_params("AllReduce", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.threshold,
            p.comparison.parse()?,
        )))
    }
}

impl NodeInfo for AllReduce {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for AllReduce {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (threshold, comparison) = (self.threshold, self.comparison);
        Ok(reduce_features(&input, |col| {
            if col.iter().all(|&x| comparison.holds(x, threshold)) {
                1.0
            } else {
                0.0
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::assert_close;
    use crate::SimError;
    use ndarray::{arr1, arr2};
    use serde_json::json;
    use std::error::Error;

    fn matrix() -> Values {
        arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into()
    }

    fn thresholds() -> Values {
        arr2(&[[0.0, -1.0, 3.0], [0.5, 1.0, 1.0]]).into()
    }

    #[test]
    fn test_sum_and_product_reduce() -> Result<(), Box<dyn Error>> {
        let sum = SumReduce::new("s", "v").run(Args::single(matrix()))?;
        assert_eq!(sum, arr1(&[5.0, 7.0, 9.0]).into());
        let prod = ProductReduce::new("p", "v").run(Args::single(matrix()))?;
        assert_eq!(prod, arr1(&[4.0, 10.0, 18.0]).into());
        Ok(())
    }

    #[test]
    fn test_min_and_max_reduce() -> Result<(), Box<dyn Error>> {
        let min = MinReduce::new("min", "v").run(Args::single(matrix()))?;
        assert_eq!(min, arr1(&[1.0, 2.0, 3.0]).into());
        let max = MaxReduce::new("max", "v").run(Args::single(matrix()))?;
        assert_eq!(max, arr1(&[4.0, 5.0, 6.0]).into());
        Ok(())
    }

    #[test]
    fn test_mean_reduce() -> Result<(), Box<dyn Error>> {
        let mean = MeanReduce::new("m", "v", MeanType::Arithmetic).run(Args::single(matrix()))?;
        assert_close(&mean, &arr1(&[2.5, 3.5, 4.5]).into());
        let gmean = MeanReduce::new("m", "v", MeanType::Geometric).run(Args::single(matrix()))?;
        assert_close(&gmean, &arr1(&[2.0, 3.1622776601683795, 4.242640687119285]).into());
        let hmean = MeanReduce::new("m", "v", MeanType::Harmonic).run(Args::single(matrix()))?;
        assert_close(&hmean, &arr1(&[1.6, 2.857142857142857, 4.0]).into());
        Ok(())
    }

    #[test]
    fn test_vector_is_a_single_feature() -> Result<(), Box<dyn Error>> {
        let out = SumReduce::new("s", "v").run(Args::single(arr1(&[1.0, 2.0]).into()))?;
        assert_eq!(out, arr1(&[1.0, 2.0]).into());
        Ok(())
    }

    #[test]
    fn test_any_reduce() -> Result<(), Box<dyn Error>> {
        let out = AnyReduce::new("any", "v", 1.0, Comparison::Ge).run(Args::single(thresholds()))?;
        assert_eq!(out, arr1(&[0.0, 1.0, 1.0]).into());
        let out = AnyReduce::new("any", "v", 0.0, Comparison::Lt).run(Args::single(thresholds()))?;
        assert_eq!(out, arr1(&[0.0, 1.0, 0.0]).into());
        Ok(())
    }

    #[test]
    fn test_all_reduce() -> Result<(), Box<dyn Error>> {
        let out = AllReduce::new("all", "v", 1.0, Comparison::Ge).run(Args::single(thresholds()))?;
        assert_eq!(out, arr1(&[0.0, 0.0, 1.0]).into());
        let out = AllReduce::new("all", "v", 0.0, Comparison::Lt).run(Args::single(thresholds()))?;
        assert_eq!(out, arr1(&[0.0, 0.0, 0.0]).into());
        Ok(())
    }

    #[test]
    fn test_threshold_params_defaults() -> Result<(), Box<dyn Error>> {
        let params = json!({"alias": "any", "input_alias": "v"});
        let mut node = AnyReduce::from_params(params.as_object().unwrap().clone())?;
        let out = node.invoke(Args::single(thresholds().into()))?;
        assert_eq!(out, arr1(&[0.0, 1.0, 1.0]).into());
        Ok(())
    }

    #[test]
    fn test_bad_comparison_is_value_error() {
        let params = json!({"alias": "any", "input_alias": "v", "comparison": ">="});
        let err = AllReduce::from_params(params.as_object().unwrap().clone()).unwrap_err();
        assert!(matches!(err, SimError::Value { .. }));
    }

    #[test]
    fn test_unknown_parameter_is_config_error() {
        let params = json!({"alias": "s", "input_alias": "v", "axis": 1});
        let err = SumReduce::from_params(params.as_object().unwrap().clone()).unwrap_err();
        assert!(matches!(err, SimError::Config { .. }));
    }
}
