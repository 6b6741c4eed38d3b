//! Constant values broadcast to the shape of an input.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{parse_params, seeded_rng, Sampler};
use crate::node::{Args, ConfigUpdates, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One value for every entry, or one value per feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Scalar(f64),
    PerFeature(Vec<f64>),
}

impl ConstantValue {
    /// Broadcasts to the shape of `like`.
    ///
    /// A per-feature list needs one entry per feature row; a vector counts as
    /// one row.
    pub fn broadcast_like(&self, like: &Values) -> Result<Values> {
        match self {
            ConstantValue::Scalar(c) => Ok(like.mapv(|_| *c)),
            ConstantValue::PerFeature(list) => {
                if list.len() != like.n_features() {
                    return Err(SimError::value(format!(
                        "cannot broadcast {} constants to shape {:?}",
                        list.len(),
                        like.shape()
                    )));
                }
                let data = Array2::from_shape_fn((list.len(), like.n_samples()), |(i, _)| list[i]);
                Ok(like.with_shape_of(data))
            }
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ConstantValue::Scalar(c) => Value::from(*c),
            ConstantValue::PerFeature(list) => Value::from(list.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConstantParams {
    alias: String,
    input_match_size: String,
    constant: ConstantValue,
}

/// A fixed constant shaped like `input_match_size`.
#[derive(Debug)]
pub struct Constant {
    base: NodeBase,
    constant: ConstantValue,
}

impl Constant {
    pub fn new(
        alias: impl Into<String>,
        input_match_size: impl Into<String>,
        constant: ConstantValue,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_match_size.into())),
            constant,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ConstantParams = parse_params("Constant", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_match_size,
            p.constant,
        )))
    }
}

impl NodeInfo for Constant {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Constant {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        self.constant.broadcast_like(&input)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DrawState {
    NotYetDrawn,
    Drawn(ConstantValue),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RandomConstantParams {
    alias: String,
    input_match_size: String,
    dist_name: String,
    #[serde(default)]
    dist_kwargs: Map<String, Value>,
    #[serde(default)]
    by_feat: bool,
    #[serde(default)]
    constant: Option<ConstantValue>,
    #[serde(default)]
    seed: Option<u64>,
}

/// A constant drawn once from a named distribution and reused afterwards.
///
/// With `by_feat` one value is drawn per feature row. The drawn value is
/// reported as the `constant` config update, and a step that already carries
/// `constant` starts out drawn, so a saved configuration replays exactly.
#[derive(Debug)]
pub struct RandomConstant {
    base: NodeBase,
    sampler: Sampler,
    by_feat: bool,
    state: DrawState,
    rng: StdRng,
}

impl RandomConstant {
    pub fn new(
        alias: impl Into<String>,
        input_match_size: impl Into<String>,
        sampler: Sampler,
        by_feat: bool,
        seed: Option<u64>,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_match_size.into())),
            sampler,
            by_feat,
            state: DrawState::NotYetDrawn,
            rng: seeded_rng(seed),
        }
    }

    /// Starts from an already drawn constant.
    pub fn with_constant(mut self, constant: ConstantValue) -> Self {
        self.state = DrawState::Drawn(constant);
        self
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: RandomConstantParams = parse_params("RandomConstant", params)?;
        let sampler = Sampler::from_name(&p.dist_name, &p.dist_kwargs)?;
        let mut node = Self::new(p.alias, p.input_match_size, sampler, p.by_feat, p.seed);
        if let Some(constant) = p.constant {
            node = node.with_constant(constant);
        }
        Ok(Node::function(node))
    }

    /// The drawn constant, if any.
    pub fn constant(&self) -> Option<&ConstantValue> {
        match &self.state {
            DrawState::Drawn(c) => Some(c),
            DrawState::NotYetDrawn => None,
        }
    }

    fn draw(&mut self, like: &Values) -> ConstantValue {
        if self.by_feat {
            ConstantValue::PerFeature(
                (0..like.n_features())
                    .map(|_| self.sampler.sample(&mut self.rng))
                    .collect(),
            )
        } else {
            ConstantValue::Scalar(self.sampler.sample(&mut self.rng))
        }
    }
}

impl NodeInfo for RandomConstant {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn config_updates(&self) -> ConfigUpdates {
        let mut updates = ConfigUpdates::new();
        if let DrawState::Drawn(c) = &self.state {
            updates.insert("constant".to_owned(), c.to_json());
        }
        updates
    }
}

impl FunctionNode for RandomConstant {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        if self.state == DrawState::NotYetDrawn {
            let drawn = self.draw(&input);
            self.state = DrawState::Drawn(drawn);
        }
        match &self.state {
            DrawState::Drawn(c) => c.broadcast_like(&input),
            DrawState::NotYetDrawn => Err(SimError::value(format!(
                "RandomConstant node {} has no constant",
                self.alias()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HaplotypePair, NodeValue};
    use ndarray::{arr1, arr2};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::error::Error;

    fn match_size() -> Values {
        arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into()
    }

    fn uniform() -> Sampler {
        Sampler::from_name("uniform", &Map::new()).unwrap()
    }

    #[test]
    fn test_constant_scalar_and_list() -> Result<(), Box<dyn Error>> {
        let out = Constant::new("c", "m", ConstantValue::Scalar(1.0)).run(Args::single(match_size()))?;
        assert_eq!(out, arr2(&[[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]).into());

        let out = Constant::new("c", "m", ConstantValue::PerFeature(vec![1.0, 2.0]))
            .run(Args::single(match_size()))?;
        assert_eq!(out, arr2(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).into());
        Ok(())
    }

    #[test]
    fn test_constant_list_length_must_match() {
        let mut node = Constant::new("c", "m", ConstantValue::PerFeature(vec![1.0, 2.0, 3.0]));
        assert!(node.run(Args::single(match_size())).is_err());
    }

    #[test]
    fn test_constant_params_accept_scalar_or_list() -> Result<(), Box<dyn Error>> {
        let params = json!({"alias": "c", "input_match_size": "m", "constant": [0.5]});
        let mut node = Constant::from_params(params.as_object().unwrap().clone())?;
        let out = node.invoke(Args::single(arr1(&[7.0, 8.0]).into()))?;
        assert_eq!(out, NodeValue::from(arr1(&[0.5, 0.5])));
        Ok(())
    }

    #[test]
    fn test_random_constant_draws_once() -> Result<(), Box<dyn Error>> {
        let mut node = RandomConstant::new("rc", "m", uniform(), false, Some(4));
        assert!(node.config_updates().is_empty());
        let first = node.run(Args::single(match_size()))?;
        let second = node.run(Args::single(match_size()))?;
        assert_eq!(first, second);

        let drawn = match node.constant() {
            Some(ConstantValue::Scalar(c)) => *c,
            other => panic!("unexpected draw {:?}", other),
        };
        assert!(first.iter().all(|&x| x == drawn));
        assert_eq!(node.config_updates().get("constant"), Some(&json!(drawn)));
        Ok(())
    }

    #[test]
    fn test_random_constant_by_feature() -> Result<(), Box<dyn Error>> {
        let mut node = RandomConstant::new("rc", "m", uniform(), true, Some(4));
        let out = node.run(Args::single(match_size()))?;
        let m = out.as_matrix();
        assert!(m.row(0).iter().all(|&x| x == m[[0, 0]]));
        assert!(m.row(1).iter().all(|&x| x == m[[1, 0]]));
        assert!(matches!(node.constant(), Some(ConstantValue::PerFeature(v)) if v.len() == 2));
        Ok(())
    }

    #[test]
    fn test_random_constant_replays_configured_value() -> Result<(), Box<dyn Error>> {
        let params = json!({
            "alias": "rc",
            "input_match_size": "m",
            "dist_name": "normal",
            "dist_kwargs": {"loc": 0, "scale": 1},
            "constant": 0.25
        });
        let mut node = RandomConstant::from_params(params.as_object().unwrap().clone())?;
        assert_eq!(node.config_updates().get("constant"), Some(&json!(0.25)));
        let out = node.invoke(Args::single(match_size().into()))?;
        assert_eq!(out, NodeValue::from(arr2(&[[0.25; 3], [0.25; 3]])));
        Ok(())
    }

    #[test]
    fn test_random_constant_shared_by_both_copies() -> Result<(), Box<dyn Error>> {
        let pair = HaplotypePair::new(arr1(&[0.0, 0.0]).into(), arr1(&[1.0, 1.0]).into())?;
        let mut node = Node::function(RandomConstant::new("rc", "m", uniform(), false, None));
        let out = node.invoke(Args::single(pair.into()))?;
        let pair = out.as_haplotype().unwrap();
        assert_eq!(pair.a(), pair.b());
        Ok(())
    }
}
