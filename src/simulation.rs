//! Running a simulation end to end.
//!
//! A simulation configuration is a JSON object with an `input` section and an
//! ordered list of `simulation_steps`:
//!
//! ```json
//! {
//!     "input": [{"engine": "table", "file": "genotypes.csv", "input_nodes": [{"alias": "SNP1"}]}],
//!     "simulation_steps": [
//!         {"type": "AdditiveCombine", "alias": "dose", "input_alias": "SNP1"},
//!         {"type": "SumReduce", "alias": "phenotype", "input_alias": "dose"}
//!     ]
//! }
//! ```
//!
//! Steps run in declaration order. Each reads its inputs from the values map
//! and stores its output under its alias, so a step may only refer to input
//! nodes and earlier steps.
use crate::builder::{CustomNode, NodeBuilder, StepParams};
use crate::error::{Result, SimError};
use crate::input::{InputLoader, InputRunner};
use crate::node::{Args, Node, NodeInputs};
use crate::table::to_table;
use crate::{NodeValue, SampleIds, ValuesMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A parsed simulation configuration.
///
/// Top-level keys other than `input` and `simulation_steps` are kept in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Input source descriptors, or `null` for a simulation without an
    /// input step.
    pub input: Value,
    pub simulation_steps: Vec<StepParams>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SimulationConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| SimError::config("simulation config must be a JSON object"))?;
        for section in ["input", "simulation_steps"] {
            if !object.contains_key(section) {
                return Err(SimError::config(format!(
                    "simulation config has no {} section",
                    section
                )));
            }
        }
        serde_json::from_value(value)
            .map_err(|err| SimError::config(format!("invalid simulation config: {}", err)))
    }

    /// The `input_file_map` entry, mapping file keys of input sources to
    /// paths.
    fn input_file_map(&self) -> Result<Map<String, Value>> {
        match self.extra.get("input_file_map") {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(SimError::config(format!(
                "input_file_map must be an object, got {}",
                other
            ))),
        }
    }
}

/// Where and how [`PhenoSimulation::save_output`] writes its files.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub dir: PathBuf,
    pub output_file: String,
    pub config_file: String,
    /// Field separator of the output table.
    pub sep: u8,
    pub include_config: bool,
    /// Prefix the table with a `sample_id` column.
    pub add_sample_ids: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            output_file: "output.csv".to_owned(),
            config_file: "sim_config.json".to_owned(),
            sep: b',',
            include_config: true,
            add_sample_ids: true,
        }
    }
}

impl OutputOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// A configured simulation: an input loader and the built steps.
#[derive(Debug)]
pub struct PhenoSimulation {
    config: SimulationConfig,
    input: Option<Box<dyn InputLoader>>,
    steps: Vec<Node>,
    sample_ids: Option<SampleIds>,
    config_updated: bool,
}

impl PhenoSimulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_custom_nodes(config, Vec::new())
    }

    /// Builds the simulation with extra node types available to its steps.
    pub fn with_custom_nodes(config: SimulationConfig, custom: Vec<CustomNode>) -> Result<Self> {
        let steps = NodeBuilder::with_custom(custom)?.build_steps(&config.simulation_steps)?;
        let input: Option<Box<dyn InputLoader>> = if config.input.is_null() {
            None
        } else {
            let file_map = config.input_file_map()?;
            Some(Box::new(InputRunner::from_config(&config.input, &file_map)?))
        };
        info!(n_steps = steps.len(), "built simulation");
        Ok(Self {
            config,
            input,
            steps,
            sample_ids: None,
            config_updated: false,
        })
    }

    /// Replaces the input loader, e.g. with values already in memory.
    pub fn with_input_loader(mut self, loader: impl InputLoader + 'static) -> Self {
        self.input = Some(Box::new(loader));
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::new(SimulationConfig::from_value(value)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// A simulation from a list of steps and an input section.
    pub fn from_steps(simulation_steps: Vec<StepParams>, input: Value) -> Result<Self> {
        Self::new(SimulationConfig {
            input,
            simulation_steps,
            extra: Map::new(),
        })
    }

    /// Sample ids of the last input step, in the order of every value.
    pub fn sample_ids(&self) -> Option<&[String]> {
        self.sample_ids.as_deref()
    }

    pub fn steps(&self) -> &[Node] {
        &self.steps
    }

    /// Loads the input values. Without an input loader this is an empty map
    /// and the sample ids stay unset.
    pub fn run_input_step(&mut self) -> Result<ValuesMap> {
        match self.input.as_mut() {
            None => Ok(ValuesMap::new()),
            Some(loader) => {
                let (sample_ids, values) = loader.load()?;
                self.sample_ids = Some(sample_ids);
                Ok(values)
            }
        }
    }

    /// Runs one node on its inputs from `values` and stores the output under
    /// the node's alias.
    pub fn run_function_node(node: &mut Node, mut values: ValuesMap) -> Result<ValuesMap> {
        let args = resolve_args(node, &values)?;
        let output = node.invoke(args)?;
        debug!(alias = node.alias(), "ran simulation step");
        values.insert(node.alias().to_owned(), output);
        Ok(values)
    }

    /// Runs every step in order.
    ///
    /// The first call also records the values random nodes drew in the
    /// configuration. Later calls leave the configuration untouched, so pass
    /// a fresh copy of the input values to rerun the steps.
    pub fn run_simulation_steps(&mut self, values: ValuesMap) -> Result<ValuesMap> {
        let mut values = values;
        for node in self.steps.iter_mut() {
            values = Self::run_function_node(node, values)?;
        }

        if !self.config_updated {
            for (step, node) in self.config.simulation_steps.iter_mut().zip(&self.steps) {
                step.extend(node.config_updates());
            }
            self.config_updated = true;
        }
        Ok(values)
    }

    pub fn run_simulation(&mut self) -> Result<ValuesMap> {
        let values = self.run_input_step()?;
        self.run_simulation_steps(values)
    }

    /// The configuration to save with the output. Replaying it gives the same
    /// random constants.
    pub fn config(&self) -> SimulationConfig {
        let mut config = self.config.clone();
        if let Some(loader) = &self.input {
            config.input = loader.config();
        }
        config
    }

    /// Writes `values` as a delimited table and, if asked, the
    /// configuration as JSON.
    pub fn save_output(&self, values: &ValuesMap, options: &OutputOptions) -> Result<()> {
        fs::create_dir_all(&options.dir)?;

        let sample_ids = if options.add_sample_ids {
            Some(self.sample_ids().ok_or_else(|| {
                SimError::config("no sample ids to write; run the input step first")
            })?)
        } else {
            None
        };
        let table = to_table(values)?;
        let output_path = options.dir.join(&options.output_file);
        let mut writer = BufWriter::new(File::create(&output_path)?);
        table.write_delimited(&mut writer, options.sep, sample_ids)?;
        writer.flush()?;

        if options.include_config {
            let mut writer = BufWriter::new(File::create(options.dir.join(&options.config_file))?);
            serde_json::to_writer_pretty(&mut writer, &self.config())?;
            writer.flush()?;
        }
        info!(path = %output_path.display(), n_columns = table.columns().len(), "saved simulation output");
        Ok(())
    }
}

fn resolve_args(node: &Node, values: &ValuesMap) -> Result<Args<NodeValue>> {
    let lookup = |alias: &String| {
        values
            .get(alias)
            .cloned()
            .ok_or_else(|| SimError::MissingAlias {
                alias: alias.clone(),
                node: node.alias().to_owned(),
            })
    };
    Ok(match node.inputs() {
        NodeInputs::None => Args::none(),
        NodeInputs::Single(alias) => Args::single(lookup(alias)?),
        NodeInputs::List(aliases) => {
            Args::positional(aliases.iter().map(lookup).collect::<Result<Vec<_>>>()?)
        }
        NodeInputs::Named(names) => Args::named(
            names
                .iter()
                .map(|(name, alias)| Ok((name.clone(), lookup(alias)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PreloadedInput;
    use crate::table::{from_table, TableReader};
    use crate::test_util::assert_close;
    use crate::{HaplotypePair, Values};
    use ndarray::{arr1, arr2};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::error::Error;

    fn steps(value: Value) -> Vec<StepParams> {
        value
            .as_array()
            .map(|steps| steps.iter().filter_map(|s| s.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    fn snp_input() -> Result<PreloadedInput, Box<dyn Error>> {
        let mut values = ValuesMap::new();
        values.insert(
            "SNP1".into(),
            HaplotypePair::new(arr1(&[0.0, 1.0]).into(), arr1(&[1.0, 1.0]).into())?.into(),
        );
        Ok(PreloadedInput::new(vec!["s1".into(), "s2".into()], values)?)
    }

    fn dose_steps() -> Vec<StepParams> {
        steps(json!([
            {"type": "AdditiveCombine", "alias": "dose", "input_alias": "SNP1"},
            {"type": "SumReduce", "alias": "phenotype", "input_alias": "dose"}
        ]))
    }

    #[test]
    fn test_end_to_end() -> Result<(), Box<dyn Error>> {
        let mut sim = PhenoSimulation::from_steps(dose_steps(), Value::Null)?
            .with_input_loader(snp_input()?);
        let values = sim.run_simulation()?;
        assert_eq!(values["dose"], NodeValue::from(arr1(&[1.0, 2.0])));
        assert_eq!(values["phenotype"], NodeValue::from(arr1(&[1.0, 2.0])));
        assert_eq!(sim.sample_ids(), Some(&["s1".to_owned(), "s2".to_owned()][..]));
        Ok(())
    }

    #[test]
    fn test_named_and_list_inputs() -> Result<(), Box<dyn Error>> {
        let mut sim = PhenoSimulation::from_steps(
            steps(json!([
                {"type": "Sum", "alias": "total", "input_aliases": ["x", "y"]},
                {"type": "IfElse", "alias": "pick", "input_cond_vals": "x",
                 "input_if_vals": "total", "input_else_vals": "y", "threshold": 2}
            ])),
            Value::Null,
        )?;
        let mut values = ValuesMap::new();
        values.insert("x".into(), arr1(&[1.0, 2.0, 3.0]).into());
        values.insert("y".into(), arr1(&[10.0, 20.0, 30.0]).into());
        let values = sim.run_simulation_steps(values)?;
        assert_eq!(values["total"], NodeValue::from(arr1(&[11.0, 22.0, 33.0])));
        assert_eq!(values["pick"], NodeValue::from(arr1(&[10.0, 22.0, 33.0])));
        Ok(())
    }

    #[test]
    fn test_no_input_step() -> Result<(), Box<dyn Error>> {
        let mut sim = PhenoSimulation::from_steps(Vec::new(), Value::Null)?;
        assert!(sim.run_input_step()?.is_empty());
        assert_eq!(sim.sample_ids(), None);
        Ok(())
    }

    #[test]
    fn test_unregistered_type_fails_at_construction() {
        let err = PhenoSimulation::from_steps(
            steps(json!([{"type": "NotARealNode", "alias": "x"}])),
            Value::Null,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::UnknownNodeType { name } if name == "NotARealNode"));
    }

    #[test]
    fn test_missing_alias() {
        let mut sim = PhenoSimulation::from_steps(
            steps(json!([{"type": "SumReduce", "alias": "p", "input_alias": "nope"}])),
            Value::Null,
        )
        .unwrap();
        let err = sim.run_simulation_steps(ValuesMap::new()).unwrap_err();
        assert!(matches!(err, SimError::MissingAlias { alias, node } if alias == "nope" && node == "p"));
    }

    #[test]
    fn test_random_constant_config_is_recorded_once() -> Result<(), Box<dyn Error>> {
        let random_steps = steps(json!([
            {"type": "RandomConstant", "alias": "c", "input_match_size": "g",
             "dist_name": "normal", "dist_kwargs": {"loc": 5.0}, "seed": 11}
        ]));
        let mut input = ValuesMap::new();
        input.insert("g".into(), arr1(&[1.0, 2.0, 3.0]).into());

        let mut sim = PhenoSimulation::from_steps(random_steps, Value::Null)?;
        let first = sim.run_simulation_steps(input.clone())?;
        let first_config = serde_json::to_string(&sim.config())?;
        assert!(sim.config().simulation_steps[0].contains_key("constant"));

        let second = sim.run_simulation_steps(input.clone())?;
        assert_eq!(serde_json::to_string(&sim.config())?, first_config);
        assert_eq!(first["c"], second["c"]);

        let mut replay = PhenoSimulation::new(sim.config())?;
        let replayed = replay.run_simulation_steps(input)?;
        let (expected, actual) = match (&first["c"], &replayed["c"]) {
            (NodeValue::Values(e), NodeValue::Values(a)) => (e.clone(), a.clone()),
            other => return Err(format!("unexpected outputs {:?}", other).into()),
        };
        assert_close(&actual, &expected);
        Ok(())
    }

    #[test]
    fn test_config_sections_required() {
        for config in [
            json!({"input": null}),
            json!({"simulation_steps": []}),
            json!([]),
        ] {
            assert!(matches!(
                SimulationConfig::from_value(config),
                Err(SimError::Config { .. })
            ));
        }
    }

    #[test]
    fn test_config_keeps_extra_keys() -> Result<(), Box<dyn Error>> {
        let raw = json!({
            "input": null,
            "simulation_steps": [{"type": "Identity", "alias": "i", "input_alias": "x"}],
            "output": {"dir": "out"}
        });
        let config = SimulationConfig::from_value(raw.clone())?;
        assert_eq!(config.extra.get("output"), Some(&json!({"dir": "out"})));
        assert_eq!(serde_json::to_value(&config)?, raw);
        Ok(())
    }

    #[test]
    fn test_table_input_from_json() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("genotypes.csv");
        fs::write(
            &path,
            "sample_id,SNP1*-*a,SNP1*-*b,age\nid1,0,1,31\nid2,1,1,42\nid3,2,0,53\n",
        )?;
        let config = json!({
            "input": [{
                "engine": "table",
                "file": "genotypes",
                "input_nodes": [{"alias": "SNP1"}, {"alias": "age"}]
            }],
            "input_file_map": {"genotypes": path.to_string_lossy()},
            "simulation_steps": [
                {"type": "AdditiveCombine", "alias": "dose", "input_alias": "SNP1"},
                {"type": "Sum", "alias": "score", "input_aliases": ["dose", "age"]}
            ]
        });
        let mut sim = PhenoSimulation::from_json_str(&config.to_string())?;
        let values = sim.run_simulation()?;
        assert_eq!(values["dose"], NodeValue::from(arr1(&[1.0, 2.0, 2.0])));
        assert_eq!(values["score"], NodeValue::from(arr1(&[32.0, 44.0, 55.0])));
        assert_eq!(sim.config().input, config["input"]);
        Ok(())
    }

    #[test]
    fn test_save_output() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out_dir = dir.path().join("run1");
        let mut sim = PhenoSimulation::from_steps(dose_steps(), Value::Null)?
            .with_input_loader(snp_input()?);
        let mut values = sim.run_simulation()?;
        values.insert("pcs".into(), Values::from(arr2(&[[0.5, 1.5], [2.5, 3.5]])).into());

        let options = OutputOptions {
            sep: b'\t',
            ..OutputOptions::new(&out_dir)
        };
        sim.save_output(&values, &options)?;

        let (table, sample_ids) = TableReader::new()
            .delimiter(b'\t')
            .from_path(out_dir.join("output.csv"))?;
        assert_eq!(sample_ids, Some(vec!["s1".to_owned(), "s2".to_owned()]));
        assert_eq!(from_table(&table)?, values);

        let saved: SimulationConfig =
            serde_json::from_str(&fs::read_to_string(out_dir.join("sim_config.json"))?)?;
        assert_eq!(saved, sim.config());
        Ok(())
    }

    #[test]
    fn test_save_output_needs_sample_ids() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let sim = PhenoSimulation::from_steps(Vec::new(), Value::Null)?;
        let mut values = ValuesMap::new();
        values.insert("x".into(), arr1(&[1.0]).into());
        assert!(sim.save_output(&values, &OutputOptions::new(dir.path())).is_err());

        let options = OutputOptions {
            add_sample_ids: false,
            include_config: false,
            ..OutputOptions::new(dir.path())
        };
        sim.save_output(&values, &options)?;
        assert!(dir.path().join("output.csv").exists());
        assert!(!dir.path().join("sim_config.json").exists());
        Ok(())
    }
}
