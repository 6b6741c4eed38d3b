//! Loading the input values a simulation starts from.
//!
//! The `input` section of a simulation configuration is a list of source
//! descriptors. Each names an `engine`, a data file and the `input_nodes`
//! (aliases) it provides:
//!
//! ```json
//! "input": [
//!     {
//!         "engine": "table",
//!         "file": "genotypes.tsv",
//!         "sep": "\t",
//!         "input_nodes": [{"alias": "LDLR_upstream_variant"}]
//!     }
//! ]
//! ```
//!
//! Only samples present in every source are kept, in the order of the first
//! source.
use crate::error::{Result, SimError};
use crate::table::{from_table, Table, TableReader, SAMPLE_ID_COLUMN};
use crate::{NodeValue, SampleIds, ValuesMap};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Something that produces the initial values map of a simulation.
pub trait InputLoader: fmt::Debug {
    /// Loads the sample ids and the values of every input node, all in the
    /// order of the returned ids.
    fn load(&mut self) -> Result<(SampleIds, ValuesMap)>;

    /// The input configuration to save alongside the output.
    fn config(&self) -> Value;
}

/// One data source providing input nodes.
pub trait InputSource: fmt::Debug {
    /// Sample ids in the order of the source's data.
    fn sample_ids(&self) -> &[String];

    /// Aliases of the input nodes this source provides.
    fn node_aliases(&self) -> Vec<String>;

    /// Values of one input node for `sample_ids`, in that order.
    fn load_values(&self, alias: &str, sample_ids: &[String]) -> Result<NodeValue>;

    /// The descriptor this source was built from.
    fn config(&self) -> Value;
}

fn default_sep() -> String {
    ",".to_owned()
}

fn default_sample_id_column() -> String {
    SAMPLE_ID_COLUMN.to_owned()
}

#[derive(Debug, Deserialize)]
struct InputNodeConfig {
    alias: String,
}

#[derive(Debug, Deserialize)]
struct TableSourceConfig {
    file: String,
    #[serde(default = "default_sep")]
    sep: String,
    #[serde(default = "default_sample_id_column")]
    sample_id_column: String,
    input_nodes: Vec<InputNodeConfig>,
}

/// Input nodes read from a delimited table with encoded column names, as
/// written by [`Table::write_delimited`].
pub struct TableInputSource {
    config: Value,
    aliases: Vec<String>,
    sample_ids: SampleIds,
    sample_index: HashMap<String, usize>,
    values: ValuesMap,
}

impl fmt::Debug for TableInputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableInputSource")
            .field("aliases", &self.aliases)
            .field("n_samples", &self.sample_ids.len())
            .finish()
    }
}

impl TableInputSource {
    /// A source over an already loaded table.
    ///
    /// `aliases` must all be decodable from `table`; other columns are
    /// ignored.
    pub fn new(config: Value, aliases: Vec<String>, table: &Table, sample_ids: SampleIds) -> Result<Self> {
        if sample_ids.len() != table.n_samples() {
            return Err(SimError::config(format!(
                "{} sample ids for {} table rows",
                sample_ids.len(),
                table.n_samples()
            )));
        }
        let mut values = from_table(table)?;
        values.retain(|alias, _| aliases.contains(alias));
        if let Some(missing) = aliases.iter().find(|a| !values.contains_key(*a)) {
            return Err(SimError::config(format!(
                "input node {} not found in input table",
                missing
            )));
        }

        let mut sample_index = HashMap::with_capacity(sample_ids.len());
        for (i, id) in sample_ids.iter().enumerate() {
            if sample_index.insert(id.clone(), i).is_some() {
                return Err(SimError::config(format!("duplicate sample id {}", id)));
            }
        }

        Ok(Self {
            config,
            aliases,
            sample_ids,
            sample_index,
            values,
        })
    }

    /// Builds the source from its descriptor. `file` may be a key of
    /// `file_map`, in which case the mapped path is read.
    pub fn from_config(config: &Value, file_map: &Map<String, Value>) -> Result<Self> {
        let parsed: TableSourceConfig = serde_json::from_value(config.clone())
            .map_err(|err| SimError::config(format!("invalid table input source: {}", err)))?;

        let path = match file_map.get(&parsed.file) {
            Some(Value::String(path)) => path.clone(),
            Some(other) => {
                return Err(SimError::config(format!(
                    "input_file_map entry {} must be a path, got {}",
                    parsed.file, other
                )))
            }
            None => parsed.file.clone(),
        };
        let delimiter = match parsed.sep.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(SimError::config(format!(
                    "sep must be a single byte, got {:?}",
                    parsed.sep
                )))
            }
        };

        debug!(path = %path, "reading input table");
        let (table, ids) = TableReader::new()
            .delimiter(delimiter)
            .sample_id_column(Some(&parsed.sample_id_column))
            .from_path(&path)?;
        let ids = ids.unwrap_or_default();
        let aliases = parsed.input_nodes.into_iter().map(|n| n.alias).collect();
        Self::new(config.clone(), aliases, &table, ids)
    }
}

impl InputSource for TableInputSource {
    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn node_aliases(&self) -> Vec<String> {
        self.aliases.clone()
    }

    fn load_values(&self, alias: &str, sample_ids: &[String]) -> Result<NodeValue> {
        let value = self.values.get(alias).ok_or_else(|| {
            SimError::config(format!("input node {} not provided by this source", alias))
        })?;
        let indices = sample_ids
            .iter()
            .map(|id| {
                self.sample_index.get(id).copied().ok_or_else(|| {
                    SimError::value(format!("sample {} not in input source", id))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(value.select_samples(&indices))
    }

    fn config(&self) -> Value {
        self.config.clone()
    }
}

/// Loads every input node of a set of sources over their shared samples.
#[derive(Debug)]
pub struct InputRunner {
    sources: Vec<Box<dyn InputSource>>,
    sample_ids: SampleIds,
}

impl InputRunner {
    pub fn new(sources: Vec<Box<dyn InputSource>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            for alias in source.node_aliases() {
                if !seen.insert(alias.clone()) {
                    return Err(SimError::config(format!(
                        "input node {} is provided by more than one source",
                        alias
                    )));
                }
            }
        }

        let sample_ids: SampleIds = match sources.split_first() {
            None => Vec::new(),
            Some((first, rest)) => {
                let others: Vec<HashSet<&str>> = rest
                    .iter()
                    .map(|s| s.sample_ids().iter().map(String::as_str).collect())
                    .collect();
                first
                    .sample_ids()
                    .iter()
                    .filter(|id| others.iter().all(|o| o.contains(id.as_str())))
                    .cloned()
                    .collect()
            }
        };
        info!(
            n_sources = sources.len(),
            n_samples = sample_ids.len(),
            "initialized input sources"
        );
        Ok(Self {
            sources,
            sample_ids,
        })
    }

    /// Builds one source per descriptor of an `input` section.
    pub fn from_config(input: &Value, file_map: &Map<String, Value>) -> Result<Self> {
        let descriptors = input
            .as_array()
            .ok_or_else(|| SimError::config("input must be a list of input sources"))?;
        let mut sources: Vec<Box<dyn InputSource>> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match descriptor.get("engine").and_then(Value::as_str) {
                Some("table") => {
                    sources.push(Box::new(TableInputSource::from_config(descriptor, file_map)?))
                }
                Some(engine) => {
                    return Err(SimError::config(format!(
                        "invalid input engine {}; supported engines: table",
                        engine
                    )))
                }
                None => {
                    return Err(SimError::config(
                        "input source has no engine; supported engines: table",
                    ))
                }
            }
        }
        Self::new(sources)
    }

    /// Samples present in every source.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }
}

impl InputLoader for InputRunner {
    fn load(&mut self) -> Result<(SampleIds, ValuesMap)> {
        let mut values = ValuesMap::new();
        for source in &self.sources {
            for alias in source.node_aliases() {
                let value = source.load_values(&alias, &self.sample_ids)?;
                values.insert(alias, value);
            }
        }
        info!(
            n_nodes = values.len(),
            n_samples = self.sample_ids.len(),
            "loaded input data"
        );
        Ok((self.sample_ids.clone(), values))
    }

    fn config(&self) -> Value {
        Value::Array(self.sources.iter().map(|s| s.config()).collect())
    }
}

/// Input values already in memory.
#[derive(Debug, Clone)]
pub struct PreloadedInput {
    sample_ids: SampleIds,
    values: ValuesMap,
    config: Value,
}

impl PreloadedInput {
    pub fn new(sample_ids: SampleIds, values: ValuesMap) -> Result<Self> {
        if let Some((alias, value)) = values
            .iter()
            .find(|(_, v)| v.n_samples() != sample_ids.len())
        {
            return Err(SimError::value(format!(
                "input {} has {} samples, expected {}",
                alias,
                value.n_samples(),
                sample_ids.len()
            )));
        }
        Ok(Self {
            sample_ids,
            values,
            config: Value::Null,
        })
    }

    /// Sets the configuration reported for these inputs.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

impl InputLoader for PreloadedInput {
    fn load(&mut self) -> Result<(SampleIds, ValuesMap)> {
        Ok((self.sample_ids.clone(), self.values.clone()))
    }

    fn config(&self) -> Value {
        self.config.clone()
    }
}
