pub use crate::builder::{CustomNode, NodeBuilder, StepParams};
pub use crate::error::{Result, SimError};
pub use crate::input::{InputLoader, InputRunner, InputSource, PreloadedInput, TableInputSource};
pub use crate::node::{Args, CombineNode, ConfigUpdates, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
pub use crate::simulation::{OutputOptions, PhenoSimulation, SimulationConfig};
pub use crate::table::{from_table, to_table, Table};
pub use crate::{HaplotypePair, NodeValue, Values, ValuesMap};
