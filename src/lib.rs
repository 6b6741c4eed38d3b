#![crate_name = "phenosim"]
//! Phenotype simulation over per-sample, per-haplotype genotype values.
//!
//! A simulation is an ordered list of function nodes. Each node reads some
//! entries of a [`ValuesMap`], computes one output and stores it under its own
//! alias. Values are either plain [`Values`] (one vector or matrix) or a
//! [`HaplotypePair`] holding the same measurement for both chromosome copies;
//! function nodes are applied to each copy independently until a combine node
//! collapses the pair.
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::collections::BTreeMap;

pub mod prelude;

pub mod builder;
pub mod error;
pub mod func_nodes;
pub mod input;
pub mod node;
pub mod simulation;
pub mod table;

pub use error::{Result, SimError};

/// Node outputs and inputs keyed by alias.
pub type ValuesMap = BTreeMap<String, NodeValue>;
pub type SampleIds = Vec<String>;

/// Numeric data for a set of samples.
///
/// The last axis is always the sample axis, so a `Matrix` has shape
/// `(n_features, n_samples)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Vector(Array1<f64>),
    Matrix(Array2<f64>),
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Vector(v) => v.shape(),
            Values::Matrix(m) => m.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn n_samples(&self) -> usize {
        match self {
            Values::Vector(v) => v.len(),
            Values::Matrix(m) => m.ncols(),
        }
    }

    /// Number of feature rows. A vector counts as a single feature.
    pub fn n_features(&self) -> usize {
        match self {
            Values::Vector(_) => 1,
            Values::Matrix(m) => m.nrows(),
        }
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Values::Matrix(_))
    }

    /// Views the data as a matrix, a vector becoming a single row.
    pub fn as_matrix(&self) -> ArrayView2<'_, f64> {
        match self {
            Values::Vector(v) => v.view().insert_axis(Axis(0)),
            Values::Matrix(m) => m.view(),
        }
    }

    /// Wraps a matrix computed from `as_matrix()` back into this value's
    /// shape.
    pub fn with_shape_of(&self, data: Array2<f64>) -> Values {
        match self {
            Values::Vector(_) => Values::Vector(data.index_axis_move(Axis(0), 0)),
            Values::Matrix(_) => Values::Matrix(data),
        }
    }

    pub fn mapv<F>(&self, f: F) -> Values
    where
        F: FnMut(f64) -> f64,
    {
        match self {
            Values::Vector(v) => Values::Vector(v.mapv(f)),
            Values::Matrix(m) => Values::Matrix(m.mapv(f)),
        }
    }

    pub fn iter(&self) -> ndarray::iter::Iter<'_, f64, ndarray::Ix2> {
        self.as_matrix().into_iter()
    }

    /// Subsets and reorders the sample axis.
    pub fn select_samples(&self, indices: &[usize]) -> Values {
        match self {
            Values::Vector(v) => Values::Vector(v.select(Axis(0), indices)),
            Values::Matrix(m) => Values::Matrix(m.select(Axis(1), indices)),
        }
    }

    fn at(&self, feature: usize, sample: usize) -> f64 {
        match self {
            Values::Vector(v) => v[sample],
            Values::Matrix(m) => m[[feature, sample]],
        }
    }
}

impl From<Array1<f64>> for Values {
    fn from(v: Array1<f64>) -> Self {
        Values::Vector(v)
    }
}

impl From<Array2<f64>> for Values {
    fn from(m: Array2<f64>) -> Self {
        Values::Matrix(m)
    }
}

/// Applies `f` elementwise across several values.
///
/// Every input must have the same number of samples. Vectors are broadcast
/// over the feature rows of any matrix input and all matrix inputs must share
/// their shape. The output is a matrix if any input is one.
pub fn broadcast_zip<F>(values: &[&Values], mut f: F) -> Result<Values>
where
    F: FnMut(&[f64]) -> f64,
{
    let first = values
        .first()
        .ok_or_else(|| SimError::value("at least one input is required"))?;
    let n_samples = first.n_samples();
    let mut n_features: Option<usize> = None;

    for v in values {
        if v.n_samples() != n_samples {
            return Err(SimError::value(format!(
                "operands could not be broadcast together with shapes {:?} and {:?}",
                first.shape(),
                v.shape()
            )));
        }
        if let Values::Matrix(m) = v {
            match n_features {
                None => n_features = Some(m.nrows()),
                Some(rows) if rows != m.nrows() => {
                    return Err(SimError::value(format!(
                        "matrix inputs must share their shape, got {} and {} feature rows",
                        rows,
                        m.nrows()
                    )));
                }
                Some(_) => {}
            }
        }
    }

    let mut buf = vec![0.0; values.len()];
    Ok(match n_features {
        None => Values::Vector(Array1::from_shape_fn(n_samples, |j| {
            for (k, v) in values.iter().enumerate() {
                buf[k] = v.at(0, j);
            }
            f(&buf)
        })),
        Some(rows) => Values::Matrix(Array2::from_shape_fn((rows, n_samples), |(i, j)| {
            for (k, v) in values.iter().enumerate() {
                buf[k] = v.at(i, j);
            }
            f(&buf)
        })),
    })
}

/// The same measurement taken on both chromosome copies of every sample.
///
/// Copy `a` is always the first copy and copy `b` the second, for every node
/// working on the same samples. Both copies always have the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct HaplotypePair {
    a: Values,
    b: Values,
}

impl HaplotypePair {
    pub fn new(a: Values, b: Values) -> Result<Self> {
        if a.shape() != b.shape() {
            return Err(SimError::type_error(format!(
                "haplotype copies must share their shape, got {:?} and {:?}",
                a.shape(),
                b.shape()
            )));
        }
        Ok(Self { a, b })
    }

    pub fn a(&self) -> &Values {
        &self.a
    }

    pub fn b(&self) -> &Values {
        &self.b
    }

    pub fn shape(&self) -> &[usize] {
        self.a.shape()
    }

    pub fn n_samples(&self) -> usize {
        self.a.n_samples()
    }

    pub fn into_parts(self) -> (Values, Values) {
        (self.a, self.b)
    }

    pub fn select_samples(&self, indices: &[usize]) -> HaplotypePair {
        Self {
            a: self.a.select_samples(indices),
            b: self.b.select_samples(indices),
        }
    }
}

/// An entry of the values map.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Values(Values),
    Haplotype(HaplotypePair),
}

impl NodeValue {
    pub fn n_samples(&self) -> usize {
        match self {
            NodeValue::Values(v) => v.n_samples(),
            NodeValue::Haplotype(h) => h.n_samples(),
        }
    }

    pub fn is_haplotype(&self) -> bool {
        matches!(self, NodeValue::Haplotype(_))
    }

    pub fn as_values(&self) -> Option<&Values> {
        match self {
            NodeValue::Values(v) => Some(v),
            NodeValue::Haplotype(_) => None,
        }
    }

    pub fn as_haplotype(&self) -> Option<&HaplotypePair> {
        match self {
            NodeValue::Haplotype(h) => Some(h),
            NodeValue::Values(_) => None,
        }
    }

    pub fn select_samples(&self, indices: &[usize]) -> NodeValue {
        match self {
            NodeValue::Values(v) => NodeValue::Values(v.select_samples(indices)),
            NodeValue::Haplotype(h) => NodeValue::Haplotype(h.select_samples(indices)),
        }
    }
}

impl From<Values> for NodeValue {
    fn from(v: Values) -> Self {
        NodeValue::Values(v)
    }
}

impl From<HaplotypePair> for NodeValue {
    fn from(h: HaplotypePair) -> Self {
        NodeValue::Haplotype(h)
    }
}

impl From<Array1<f64>> for NodeValue {
    fn from(v: Array1<f64>) -> Self {
        NodeValue::Values(Values::Vector(v))
    }
}

impl From<Array2<f64>> for NodeValue {
    fn from(m: Array2<f64>) -> Self {
        NodeValue::Values(Values::Matrix(m))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use std::error::Error;

    #[test]
    fn test_haplotype_pair_rejects_mismatched_shapes() {
        let err = HaplotypePair::new(arr1(&[1.0, 2.0]).into(), arr1(&[1.0]).into()).unwrap_err();
        assert!(matches!(err, SimError::Type { .. }));
    }

    #[test]
    fn test_broadcast_zip_vector_over_matrix() -> Result<(), Box<dyn Error>> {
        let v: Values = arr1(&[1.0, 2.0, 3.0]).into();
        let m: Values = arr2(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).into();
        let out = broadcast_zip(&[&v, &m, &m], |x| x.iter().sum())?;
        assert_eq!(out, arr2(&[[3.0, 4.0, 5.0], [5.0, 6.0, 7.0]]).into());
        Ok(())
    }

    #[test]
    fn test_broadcast_zip_rejects_sample_mismatch() {
        let a: Values = arr1(&[1.0, 2.0, 3.0]).into();
        let b: Values = arr1(&[1.0, 2.0]).into();
        assert!(broadcast_zip(&[&a, &b], |x| x[0]).is_err());
    }

    #[test]
    fn test_broadcast_zip_rejects_matrix_mismatch() {
        let a: Values = arr2(&[[1.0, 2.0]]).into();
        let b: Values = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into();
        assert!(broadcast_zip(&[&a, &b], |x| x[0]).is_err());
    }

    #[test]
    fn test_select_samples_reorders_last_axis() {
        let m: Values = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into();
        assert_eq!(
            m.select_samples(&[2, 0]),
            arr2(&[[3.0, 1.0], [6.0, 4.0]]).into()
        );
    }

    #[test]
    fn test_with_shape_of_restores_vector() {
        let v: Values = arr1(&[1.0, 2.0]).into();
        let doubled = v.with_shape_of(v.as_matrix().mapv(|x| x * 2.0));
        assert_eq!(doubled, arr1(&[2.0, 4.0]).into());
    }
}
