//! Clipping and rescaling nodes. Outputs keep the shape of their input.
//!
//! Scalers with `by_feat` set scale every feature row on its own, otherwise
//! all values of the input are scaled jointly. Degenerate groups (zero range,
//! zero standard deviation, zero IQR) map to fixed values instead of NaN.
use crate::builder::StepParams;
use crate::error::{Result, SimError};
use crate::func_nodes::{default_true, parse_params};
use crate::node::{Args, FunctionNode, Node, NodeBase, NodeInfo, NodeInputs};
use crate::Values;
use ndarray::ArrayViewMutD;
use serde::Deserialize;

fn scale_groups<F>(input: &Values, by_feat: bool, mut scale: F) -> Values
where
    F: FnMut(ArrayViewMutD<'_, f64>),
{
    let mut data = input.as_matrix().to_owned();
    if by_feat {
        for row in data.rows_mut() {
            scale(row.into_dyn());
        }
    } else {
        scale(data.view_mut().into_dyn());
    }
    input.with_shape_of(data)
}

fn min_max_scale(mut x: ArrayViewMutD<'_, f64>) {
    let min = x.fold(f64::INFINITY, |acc, &v| acc.min(v));
    let max = x.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let range = max - min;
    if range == 0.0 {
        x.fill(0.5);
    } else {
        x.mapv_inplace(|v| (v - min) / range);
    }
}

fn standard_scale(mut x: ArrayViewMutD<'_, f64>) {
    if x.is_empty() {
        return;
    }
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let std = (x.fold(0.0, |acc, &v| acc + (v - mean).powi(2)) / n).sqrt();
    if std == 0.0 {
        x.fill(0.0);
    } else {
        x.mapv_inplace(|v| (v - mean) / std);
    }
}

/// Percentile of sorted data with linear interpolation between ranks.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClipParams {
    alias: String,
    input_alias: String,
    #[serde(default)]
    min_val: Option<f64>,
    #[serde(default)]
    max_val: Option<f64>,
}

/// Clips values to `[min_val, max_val]`. Either bound may be left open.
#[derive(Debug)]
pub struct Clip {
    base: NodeBase,
    min_val: Option<f64>,
    max_val: Option<f64>,
}

impl Clip {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        min_val: Option<f64>,
        max_val: Option<f64>,
    ) -> Result<Self> {
        let alias = alias.into();
        if let (Some(lo), Some(hi)) = (min_val, max_val) {
            if lo > hi {
                return Err(SimError::value(format!(
                    "Clip node {}: min_val {} is greater than max_val {}",
                    alias, lo, hi
                )));
            }
        }
        Ok(Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            min_val,
            max_val,
        })
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ClipParams = parse_params("Clip", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.min_val,
            p.max_val,
        )?))
    }
}

impl NodeInfo for Clip {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for Clip {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        let (lo, hi) = (self.min_val, self.max_val);
        Ok(input.mapv(|mut x| {
            if let Some(lo) = lo {
                x = x.max(lo);
            }
            if let Some(hi) = hi {
                x = x.min(hi);
            }
            x
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScalerParams {
    alias: String,
    input_alias: String,
    #[serde(default = "default_true")]
    by_feat: bool,
}

/// Scales values to `[0, 1]`. A group with a single distinct value maps to
/// 0.5.
#[derive(Debug)]
pub struct MinMaxScaler {
    base: NodeBase,
    by_feat: bool,
}

impl MinMaxScaler {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>, by_feat: bool) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            by_feat,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ScalerParams = parse_params("MinMaxScaler", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias, p.by_feat)))
    }
}

impl NodeInfo for MinMaxScaler {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for MinMaxScaler {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(scale_groups(&input, self.by_feat, min_max_scale))
    }
}

/// Scales values to mean 0 and (population) standard deviation 1. A group
/// with zero standard deviation maps to 0.
#[derive(Debug)]
pub struct StandardScaler {
    base: NodeBase,
    by_feat: bool,
}

impl StandardScaler {
    pub fn new(alias: impl Into<String>, input_alias: impl Into<String>, by_feat: bool) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            by_feat,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: ScalerParams = parse_params("StandardScaler", params)?;
        Ok(Node::function(Self::new(p.alias, p.input_alias, p.by_feat)))
    }
}

impl NodeInfo for StandardScaler {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for StandardScaler {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(scale_groups(&input, self.by_feat, standard_scale))
    }
}

fn default_out_iqr() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RobustScalerParams {
    alias: String,
    input_alias: String,
    #[serde(default = "default_true")]
    by_feat: bool,
    #[serde(default = "default_out_iqr")]
    out_iqr: f64,
    #[serde(default)]
    out_median: f64,
}

/// Centers on the median and divides by the interquartile range, then
/// rescales to `out_iqr` and shifts to `out_median`.
///
/// A zero IQR is replaced by 1.
#[derive(Debug)]
pub struct RobustScaler {
    base: NodeBase,
    by_feat: bool,
    out_iqr: f64,
    out_median: f64,
}

impl RobustScaler {
    pub fn new(
        alias: impl Into<String>,
        input_alias: impl Into<String>,
        by_feat: bool,
        out_iqr: f64,
        out_median: f64,
    ) -> Self {
        Self {
            base: NodeBase::new(alias, NodeInputs::Single(input_alias.into())),
            by_feat,
            out_iqr,
            out_median,
        }
    }

    pub fn from_params(params: StepParams) -> Result<Node> {
        let p: RobustScalerParams = parse_params("RobustScaler", params)?;
        Ok(Node::function(Self::new(
            p.alias,
            p.input_alias,
            p.by_feat,
            p.out_iqr,
            p.out_median,
        )))
    }

    fn scale(&self, mut x: ArrayViewMutD<'_, f64>) {
        if x.is_empty() {
            return;
        }
        let mut sorted: Vec<f64> = x.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let median = percentile(&sorted, 50.0);
        let mut iqr = percentile(&sorted, 75.0) - percentile(&sorted, 25.0);
        if iqr == 0.0 {
            iqr = 1.0;
        }
        let (out_iqr, out_median) = (self.out_iqr, self.out_median);
        x.mapv_inplace(|v| (v - median) / iqr * out_iqr + out_median);
    }
}

impl NodeInfo for RobustScaler {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl FunctionNode for RobustScaler {
    fn run(&mut self, args: Args<Values>) -> Result<Values> {
        let input = args.into_single(self.alias())?;
        Ok(scale_groups(&input, self.by_feat, |x| self.scale(x)))
    }
}
