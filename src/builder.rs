//! Node type registry.
//!
//! A [`NodeBuilder`] maps the `type` of a simulation step to a constructor.
//! Every built-in node is registered by [`NodeBuilder::new`]; callers add
//! their own types with [`NodeBuilder::with_custom`].
use crate::error::{Result, SimError};
use crate::func_nodes::*;
use crate::node::Node;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// A step configuration without its `type` key.
pub type StepParams = Map<String, Value>;

pub type NodeConstructor = Box<dyn Fn(StepParams) -> Result<Node>>;

/// A caller-provided node type.
pub struct CustomNode {
    pub name: String,
    pub constructor: NodeConstructor,
}

impl CustomNode {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(StepParams) -> Result<Node> + 'static,
    {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
        }
    }
}

impl fmt::Debug for CustomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomNode").field("name", &self.name).finish()
    }
}

type BuiltinConstructor = fn(StepParams) -> Result<Node>;

const BUILTIN_NODES: &[(&str, BuiltinConstructor)] = &[
    // haplotype combination
    ("AdditiveCombine", AdditiveCombine::from_params),
    ("MaxCombine", MaxCombine::from_params),
    ("MinCombine", MinCombine::from_params),
    ("MeanCombine", MeanCombine::from_params),
    // math
    ("Identity", Identity::from_params),
    ("Sum", Sum::from_params),
    ("Product", Product::from_params),
    // reduction
    ("SumReduce", SumReduce::from_params),
    ("ProductReduce", ProductReduce::from_params),
    ("MinReduce", MinReduce::from_params),
    ("MaxReduce", MaxReduce::from_params),
    ("MeanReduce", MeanReduce::from_params),
    ("AnyReduce", AnyReduce::from_params),
    ("AllReduce", AllReduce::from_params),
    // scaling
    ("Clip", Clip::from_params),
    ("MinMaxScaler", MinMaxScaler::from_params),
    ("StandardScaler", StandardScaler::from_params),
    ("RobustScaler", RobustScaler::from_params),
    // noise
    ("GaussianNoise", GaussianNoise::from_params),
    ("Heritability", Heritability::from_params),
    // conditional
    ("IfElse", IfElse::from_params),
    // constants and distributions
    ("Constant", Constant::from_params),
    ("RandomConstant", RandomConstant::from_params),
    ("Distribution", Distribution::from_params),
    // utility and transforms
    ("Concatenate", Concatenate::from_params),
    ("ReLU", ReLU::from_params),
    ("Sigmoid", Sigmoid::from_params),
    ("Softmax", Softmax::from_params),
    ("Tanh", Tanh::from_params),
];

fn check_custom_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        "name may only contain ASCII letters, digits and underscores"
    } else {
        return Ok(());
    };
    Err(SimError::InvalidCustomNode {
        name: name.to_owned(),
        reason: reason.to_owned(),
    })
}

/// Builds nodes from step configurations by type name.
pub struct NodeBuilder {
    constructors: BTreeMap<String, NodeConstructor>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("node_types", &self.node_types())
            .finish()
    }
}

impl NodeBuilder {
    /// A builder knowing every built-in node type.
    pub fn new() -> Self {
        let mut constructors: BTreeMap<String, NodeConstructor> = BTreeMap::new();
        for &(name, constructor) in BUILTIN_NODES {
            constructors.insert(name.to_owned(), Box::new(constructor));
        }
        Self { constructors }
    }

    /// A builder knowing the built-ins plus `custom`.
    ///
    /// Custom names must be non-empty, made of `[A-Za-z0-9_]` and unique
    /// within `custom`. A custom node may replace a built-in of the same name.
    pub fn with_custom(custom: Vec<CustomNode>) -> Result<Self> {
        let mut builder = Self::new();
        let mut seen = Vec::with_capacity(custom.len());
        for node in custom {
            check_custom_name(&node.name)?;
            if seen.contains(&node.name) {
                return Err(SimError::InvalidCustomNode {
                    name: node.name,
                    reason: "registered more than once".to_owned(),
                });
            }
            seen.push(node.name.clone());
            builder.register(node);
        }
        Ok(builder)
    }

    /// Registers a node type, replacing any existing one of the same name.
    pub fn register(&mut self, node: CustomNode) {
        if self.constructors.contains_key(&node.name) {
            warn!(node_type = %node.name, "custom node replaces a registered node type");
        } else {
            debug!(node_type = %node.name, "registered custom node type");
        }
        self.constructors.insert(node.name, node.constructor);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names in sorted order.
    pub fn node_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Builds one node of type `type_name` from its parameters.
    pub fn create(&self, type_name: &str, params: StepParams) -> Result<Node> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| SimError::UnknownNodeType {
                name: type_name.to_owned(),
            })?;
        let expected_alias = params.get("alias").and_then(Value::as_str).map(str::to_owned);
        let node = constructor(params)?;
        if let Some(alias) = expected_alias {
            if node.alias() != alias {
                return Err(SimError::InvalidCustomNode {
                    name: type_name.to_owned(),
                    reason: format!(
                        "constructor produced alias {} for a step with alias {}",
                        node.alias(),
                        alias
                    ),
                });
            }
        }
        Ok(node)
    }

    /// Builds every step in order, failing on the first bad step.
    pub fn build_steps(&self, steps: &[StepParams]) -> Result<Vec<Node>> {
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let mut params = step.clone();
                let type_name = match params.remove("type") {
                    Some(Value::String(name)) => name,
                    Some(other) => {
                        return Err(SimError::config(format!(
                            "simulation step {} has a non-string type {}",
                            i, other
                        )))
                    }
                    None => {
                        return Err(SimError::config(format!(
                            "simulation step {} has no type",
                            i
                        )))
                    }
                };
                let node = self.create(&type_name, params)?;
                debug!(step = i, node_type = %type_name, alias = node.alias(), "built node");
                Ok(node)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Args, FunctionNode, NodeBase, NodeInfo, NodeInputs};
    use crate::{NodeValue, Values};
    use ndarray::arr1;
    use serde_json::json;
    use std::error::Error;

    #[derive(Debug)]
    struct Double {
        base: NodeBase,
    }

    impl NodeInfo for Double {
        fn base(&self) -> &NodeBase {
            &self.base
        }
    }

    impl FunctionNode for Double {
        fn run(&mut self, args: Args<Values>) -> crate::Result<Values> {
            Ok(args.into_single(self.alias())?.mapv(|x| 2.0 * x))
        }
    }

    fn double_node(name: &str) -> CustomNode {
        CustomNode::new(name, |params: StepParams| {
            let alias = params
                .get("alias")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let input = params
                .get("input_alias")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            Ok(Node::function(Double {
                base: NodeBase::new(alias, NodeInputs::Single(input)),
            }))
        })
    }

    fn params(value: Value) -> StepParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_builtins_registered() {
        let builder = NodeBuilder::new();
        for name in ["AdditiveCombine", "SumReduce", "RandomConstant", "Softmax", "IfElse"] {
            assert!(builder.is_registered(name), "{} missing", name);
        }
        assert_eq!(builder.node_types().len(), 29);
    }

    #[test]
    fn test_create_builtin() -> Result<(), Box<dyn Error>> {
        let builder = NodeBuilder::new();
        let node = builder.create("Sum", params(json!({"alias": "s", "input_aliases": ["a", "b"]})))?;
        assert_eq!(node.alias(), "s");
        assert_eq!(node.inputs().aliases(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_unknown_type() {
        let err = NodeBuilder::new()
            .create("Frobnicate", params(json!({"alias": "x"})))
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownNodeType { name } if name == "Frobnicate"));
    }

    #[test]
    fn test_custom_node() -> Result<(), Box<dyn Error>> {
        let builder = NodeBuilder::with_custom(vec![double_node("Double")])?;
        let mut node = builder.create("Double", params(json!({"alias": "d", "input_alias": "x"})))?;
        let out = node.invoke(Args::single(arr1(&[1.0, 2.0]).into()))?;
        assert_eq!(out, NodeValue::from(arr1(&[2.0, 4.0])));
        Ok(())
    }

    #[test]
    fn test_custom_node_may_replace_builtin() -> Result<(), Box<dyn Error>> {
        let builder = NodeBuilder::with_custom(vec![double_node("Identity")])?;
        let mut node = builder.create("Identity", params(json!({"alias": "d", "input_alias": "x"})))?;
        let out = node.invoke(Args::single(arr1(&[3.0]).into()))?;
        assert_eq!(out, NodeValue::from(arr1(&[6.0])));
        Ok(())
    }

    #[test]
    fn test_invalid_custom_names() {
        for bad in ["", "with space", "dash-name"] {
            let err = NodeBuilder::with_custom(vec![double_node(bad)]).unwrap_err();
            assert!(matches!(err, SimError::InvalidCustomNode { .. }), "{:?}", bad);
        }
        let err = NodeBuilder::with_custom(vec![double_node("Twice"), double_node("Twice")])
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidCustomNode { name, .. } if name == "Twice"));
    }

    #[test]
    fn test_alias_mismatch_rejected() {
        let renaming = CustomNode::new("Renaming", |_params: StepParams| {
            Ok(Node::function(Double {
                base: NodeBase::new("other", NodeInputs::None),
            }))
        });
        let builder = NodeBuilder::with_custom(vec![renaming]).unwrap();
        assert!(builder
            .create("Renaming", params(json!({"alias": "mine"})))
            .is_err());
    }

    #[test]
    fn test_build_steps() -> Result<(), Box<dyn Error>> {
        let steps = vec![
            params(json!({"type": "AdditiveCombine", "alias": "dose", "input_alias": "snp"})),
            params(json!({"type": "SumReduce", "alias": "pheno", "input_alias": "dose"})),
        ];
        let nodes = NodeBuilder::new().build_steps(&steps)?;
        let aliases: Vec<&str> = nodes.iter().map(Node::alias).collect();
        assert_eq!(aliases, vec!["dose", "pheno"]);
        assert!(nodes[0].is_combine());

        let missing_type = vec![params(json!({"alias": "x"}))];
        assert!(matches!(
            NodeBuilder::new().build_steps(&missing_type),
            Err(SimError::Config { .. })
        ));
        Ok(())
    }
}
