//! Node contracts and the haplotype dispatch rule.
//!
//! A [`FunctionNode`] only ever computes on plain [`Values`]. When any of its
//! inputs is a [`HaplotypePair`], [`Node::invoke`] runs it once per copy: copy
//! `a` of every pair together, then copy `b`, with plain values passed
//! unchanged to both runs. The two results are paired again in the same order.
//!
//! A [`CombineNode`] takes only haplotype pairs and is the one place where a
//! pair is collapsed to plain values.
use crate::error::{Result, SimError};
use crate::{HaplotypePair, NodeValue, Values};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Step configuration entries a node wants written back after running,
/// e.g. the values a random node drew.
pub type ConfigUpdates = Map<String, Value>;

/// How a node's inputs are looked up in the values map.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeInputs {
    /// The node is called without arguments.
    None,
    /// One alias, passed as the single positional argument.
    Single(String),
    /// Aliases passed as positional arguments in order.
    List(Vec<String>),
    /// Argument name to alias, passed as named arguments.
    Named(BTreeMap<String, String>),
}

impl NodeInputs {
    /// Reads an `inputs` wiring value from a step configuration.
    pub fn from_json(alias: &str, value: &Value) -> Result<Self> {
        let invalid = || SimError::InvalidInputs {
            alias: alias.to_owned(),
            found: value.to_string(),
        };
        match value {
            Value::Null => Ok(NodeInputs::None),
            Value::String(s) => Ok(NodeInputs::Single(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(NodeInputs::List)
                .ok_or_else(invalid),
            Value::Object(map) => map
                .iter()
                .map(|(name, v)| v.as_str().map(|a| (name.clone(), a.to_owned())))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(NodeInputs::Named)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    /// Every alias this wiring refers to.
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            NodeInputs::None => vec![],
            NodeInputs::Single(a) => vec![a.as_str()],
            NodeInputs::List(aliases) => aliases.iter().map(String::as_str).collect(),
            NodeInputs::Named(map) => map.values().map(String::as_str).collect(),
        }
    }
}

/// Positional and named arguments to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Args<T> {
    pub positional: Vec<T>,
    pub named: BTreeMap<String, T>,
}

impl<T> Default for Args<T> {
    fn default() -> Self {
        Self {
            positional: Vec::new(),
            named: BTreeMap::new(),
        }
    }
}

impl<T> Args<T> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(value: T) -> Self {
        Self::positional(vec![value])
    }

    pub fn positional(values: Vec<T>) -> Self {
        Self {
            positional: values,
            named: BTreeMap::new(),
        }
    }

    pub fn named(values: BTreeMap<String, T>) -> Self {
        Self {
            positional: Vec::new(),
            named: values,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All arguments, positional first.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.positional.iter().chain(self.named.values())
    }

    /// Takes the only argument of a single-input node.
    pub fn into_single(mut self, node: &str) -> Result<T> {
        if self.len() != 1 {
            return Err(SimError::value(format!(
                "node {} takes exactly one input, got {}",
                node,
                self.len()
            )));
        }
        match self.positional.pop() {
            Some(value) => Ok(value),
            None => self
                .named
                .into_values()
                .next()
                .ok_or_else(|| SimError::value(format!("node {} got no input", node))),
        }
    }

    /// Removes a named argument.
    pub fn take_named(&mut self, name: &str, node: &str) -> Result<T> {
        self.named.remove(name).ok_or_else(|| {
            SimError::value(format!("node {} is missing input argument {}", node, name))
        })
    }

    pub fn try_map<U, F>(self, mut f: F) -> Result<Args<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(Args {
            positional: self
                .positional
                .into_iter()
                .map(&mut f)
                .collect::<Result<_>>()?,
            named: self
                .named
                .into_iter()
                .map(|(name, value)| Ok((name, f(value)?)))
                .collect::<Result<_>>()?,
        })
    }
}

/// Alias and input wiring shared by every node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBase {
    alias: String,
    inputs: NodeInputs,
}

impl NodeBase {
    pub fn new(alias: impl Into<String>, inputs: NodeInputs) -> Self {
        Self {
            alias: alias.into(),
            inputs,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn inputs(&self) -> &NodeInputs {
        &self.inputs
    }
}

pub trait NodeInfo: fmt::Debug {
    fn base(&self) -> &NodeBase;

    fn alias(&self) -> &str {
        self.base().alias()
    }

    fn inputs(&self) -> &NodeInputs {
        self.base().inputs()
    }

    /// Values drawn at random by this node, reported once they exist.
    fn config_updates(&self) -> ConfigUpdates {
        ConfigUpdates::new()
    }
}

/// A node computing on plain values. Haplotype pairs are split before `run`
/// is called, see [`Node::invoke`].
pub trait FunctionNode: NodeInfo {
    fn run(&mut self, args: Args<Values>) -> Result<Values>;
}

/// A node collapsing haplotype pairs into plain values.
pub trait CombineNode: NodeInfo {
    fn combine(&mut self, args: Args<HaplotypePair>) -> Result<Values>;
}

/// A constructed simulation step.
#[derive(Debug)]
pub enum Node {
    Function(Box<dyn FunctionNode>),
    Combine(Box<dyn CombineNode>),
}

impl Node {
    pub fn function(node: impl FunctionNode + 'static) -> Self {
        Node::Function(Box::new(node))
    }

    pub fn combine(node: impl CombineNode + 'static) -> Self {
        Node::Combine(Box::new(node))
    }

    pub fn alias(&self) -> &str {
        match self {
            Node::Function(node) => node.alias(),
            Node::Combine(node) => node.alias(),
        }
    }

    pub fn inputs(&self) -> &NodeInputs {
        match self {
            Node::Function(node) => node.inputs(),
            Node::Combine(node) => node.inputs(),
        }
    }

    pub fn config_updates(&self) -> ConfigUpdates {
        match self {
            Node::Function(node) => node.config_updates(),
            Node::Combine(node) => node.config_updates(),
        }
    }

    pub fn is_combine(&self) -> bool {
        matches!(self, Node::Combine(_))
    }

    pub fn invoke(&mut self, args: Args<NodeValue>) -> Result<NodeValue> {
        match self {
            Node::Function(node) => invoke_function(node.as_mut(), args),
            Node::Combine(node) => {
                let alias = node.alias().to_owned();
                let pairs = args.try_map(|value| match value {
                    NodeValue::Haplotype(pair) => Ok(pair),
                    NodeValue::Values(_) => Err(SimError::type_error(format!(
                        "combine node {} takes only haplotype values",
                        alias
                    ))),
                })?;
                node.combine(pairs).map(NodeValue::Values)
            }
        }
    }
}

/// Runs a function node, once per haplotype copy if any argument is a pair.
pub fn invoke_function(node: &mut dyn FunctionNode, args: Args<NodeValue>) -> Result<NodeValue> {
    if !args.values().any(NodeValue::is_haplotype) {
        let args = args.try_map(|value| match value {
            NodeValue::Values(v) => Ok(v),
            NodeValue::Haplotype(_) => Err(SimError::type_error("unexpected haplotype value")),
        })?;
        return node.run(args).map(NodeValue::Values);
    }

    let mut copy_a = Args::none();
    let mut copy_b = Args::none();
    for value in args.positional {
        let (a, b) = split_copies(value);
        copy_a.positional.push(a);
        copy_b.positional.push(b);
    }
    for (name, value) in args.named {
        let (a, b) = split_copies(value);
        copy_a.named.insert(name.clone(), a);
        copy_b.named.insert(name, b);
    }

    let a = node.run(copy_a)?;
    let b = node.run(copy_b)?;
    Ok(NodeValue::Haplotype(HaplotypePair::new(a, b)?))
}

fn split_copies(value: NodeValue) -> (Values, Values) {
    match value {
        NodeValue::Haplotype(pair) => pair.into_parts(),
        NodeValue::Values(v) => (v.clone(), v),
    }
}
