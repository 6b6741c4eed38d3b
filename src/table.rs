//! Flat tables of simulation values, one row per sample.
//!
//! Column names encode where each column came from:
//!
//! | value | columns |
//! |---|---|
//! | vector | `alias` |
//! | matrix with F rows | `alias*-*0` .. `alias*-*{F-1}` |
//! | pair of vectors | `alias*-*a`, `alias*-*b` |
//! | pair of matrices | `alias*-*a*-*0` .., then `alias*-*b*-*0` .. |
//!
//! [`to_table`] writes columns in that canonical order, aliases sorted, and
//! [`from_table`] undoes it exactly.
use crate::error::{Result, SimError};
use crate::{HaplotypePair, NodeValue, SampleIds, Values, ValuesMap};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Separates the alias, haplotype copy and feature row parts of a column
/// name. Aliases may not contain it.
pub const COLUMN_DELIMITER: &str = "*-*";

/// Default name of the sample identifier column in delimited files.
pub const SAMPLE_ID_COLUMN: &str = "sample_id";

/// Named columns over samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl Table {
    /// `data` has one row per sample and one column per name in `columns`.
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if columns.len() != data.ncols() {
            return Err(SimError::table(format!(
                "{} column names for {} data columns",
                columns.len(),
                data.ncols()
            )));
        }
        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data.column(i))
    }

    /// Writes the table as delimited text with a header row. With
    /// `sample_ids`, a leading `sample_id` column holds them.
    pub fn write_delimited<W: Write>(
        &self,
        writer: W,
        delimiter: u8,
        sample_ids: Option<&[String]>,
    ) -> Result<()> {
        if let Some(ids) = sample_ids {
            if ids.len() != self.n_samples() {
                return Err(SimError::table(format!(
                    "{} sample ids for a table of {} samples",
                    ids.len(),
                    self.n_samples()
                )));
            }
        }

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if sample_ids.is_some() {
            header.push(SAMPLE_ID_COLUMN);
        }
        header.extend(self.columns.iter().map(String::as_str));
        wtr.write_record(&header)?;

        for (i, row) in self.data.axis_iter(Axis(0)).enumerate() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if let Some(ids) = sample_ids {
                record.push(ids[i].clone());
            }
            record.extend(row.iter().map(|x| x.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Reads delimited text written by [`Table::write_delimited`], or any
/// delimited file with a header row of encoded column names.
#[derive(Debug, Clone)]
pub struct TableReader {
    delimiter: u8,
    sample_id_column: Option<String>,
}

impl Default for TableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableReader {
    /// A comma separated reader expecting a `sample_id` column.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            sample_id_column: Some(SAMPLE_ID_COLUMN.to_owned()),
        }
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Column holding sample ids, or `None` if every column is a value
    /// column.
    pub fn sample_id_column(&mut self, name: Option<&str>) -> &mut Self {
        self.sample_id_column = name.map(str::to_owned);
        self
    }

    pub fn from_path(&self, path: impl AsRef<Path>) -> Result<(Table, Option<SampleIds>)> {
        self.from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(&self, reader: R) -> Result<(Table, Option<SampleIds>)> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let id_index = match &self.sample_id_column {
            Some(name) => Some(headers.iter().position(|h| h == name).ok_or_else(|| {
                SimError::table(format!("no sample id column {} in header", name))
            })?),
            None => None,
        };
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != id_index)
            .map(|(_, h)| h.to_owned())
            .collect();

        let mut sample_ids = Vec::new();
        let mut flat = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                if Some(i) == id_index {
                    sample_ids.push(field.to_owned());
                    continue;
                }
                let value = field.trim().parse::<f64>().map_err(|_| {
                    SimError::table(format!(
                        "row {} column {}: {:?} is not a number",
                        row, &headers[i], field
                    ))
                })?;
                flat.push(value);
            }
        }

        let n_rows = if columns.is_empty() {
            sample_ids.len()
        } else {
            flat.len() / columns.len()
        };
        let data = Array2::from_shape_vec((n_rows, columns.len()), flat)
            .map_err(|err| SimError::table(format!("ragged table: {}", err)))?;
        let table = Table::new(columns, data)?;
        Ok((table, id_index.map(|_| sample_ids)))
    }
}

/// Reads a delimited table with [`TableReader`].
pub fn read_delimited<R: Read>(
    reader: R,
    delimiter: u8,
    sample_id_column: Option<&str>,
) -> Result<(Table, Option<SampleIds>)> {
    TableReader::new()
        .delimiter(delimiter)
        .sample_id_column(sample_id_column)
        .from_reader(reader)
}

fn column_name(alias: &str, parts: &[&str]) -> String {
    let mut name = alias.to_owned();
    for part in parts {
        name.push_str(COLUMN_DELIMITER);
        name.push_str(part);
    }
    name
}

fn push_values(
    columns: &mut Vec<(String, Array1<f64>)>,
    alias: &str,
    copy: Option<&str>,
    values: &Values,
) {
    match values {
        Values::Vector(v) => {
            let parts: Vec<&str> = copy.into_iter().collect();
            columns.push((column_name(alias, &parts), v.clone()));
        }
        Values::Matrix(m) => {
            for (i, row) in m.axis_iter(Axis(0)).enumerate() {
                let index = i.to_string();
                let mut parts: Vec<&str> = copy.into_iter().collect();
                parts.push(&index);
                columns.push((column_name(alias, &parts), row.to_owned()));
            }
        }
    }
}

/// Flattens a values map into a table, one row per sample.
pub fn to_table(values: &ValuesMap) -> Result<Table> {
    let mut n_samples: Option<usize> = None;
    let mut columns: Vec<(String, Array1<f64>)> = Vec::new();

    for (alias, value) in values {
        if alias.contains(COLUMN_DELIMITER) {
            return Err(SimError::table(format!(
                "alias {} contains the column delimiter {}",
                alias, COLUMN_DELIMITER
            )));
        }
        let n_features = match value {
            NodeValue::Values(v) => v.n_features(),
            NodeValue::Haplotype(pair) => pair.a().n_features(),
        };
        if n_features == 0 {
            return Err(SimError::table(format!(
                "alias {} has no feature rows to write",
                alias
            )));
        }
        match n_samples {
            None => n_samples = Some(value.n_samples()),
            Some(n) if n != value.n_samples() => {
                return Err(SimError::table(format!(
                    "alias {} has {} samples, expected {}",
                    alias,
                    value.n_samples(),
                    n
                )))
            }
            Some(_) => {}
        }
        match value {
            NodeValue::Values(v) => push_values(&mut columns, alias, None, v),
            NodeValue::Haplotype(pair) => {
                push_values(&mut columns, alias, Some("a"), pair.a());
                push_values(&mut columns, alias, Some("b"), pair.b());
            }
        }
    }

    let n_samples = n_samples.unwrap_or(0);
    let data = Array2::from_shape_fn((n_samples, columns.len()), |(s, c)| columns[c].1[s]);
    Table::new(columns.into_iter().map(|(name, _)| name).collect(), data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CopyLabel {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Vector,
    MatrixRow(usize),
    PairVector(CopyLabel),
    PairRow(CopyLabel, usize),
}

impl ColumnKind {
    fn encoding(self) -> &'static str {
        match self {
            ColumnKind::Vector => "vector",
            ColumnKind::MatrixRow(_) => "matrix",
            ColumnKind::PairVector(_) => "haplotype vector",
            ColumnKind::PairRow(..) => "haplotype matrix",
        }
    }
}

fn parse_copy(part: &str) -> Option<CopyLabel> {
    match part {
        "a" => Some(CopyLabel::A),
        "b" => Some(CopyLabel::B),
        _ => None,
    }
}

fn parse_row(part: &str) -> Option<usize> {
    if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

/// Splits a column name into its alias and encoding. Suffixes are read from
/// the right, so an alias may end in characters of the delimiter.
fn parse_column_name(name: &str) -> Result<(&str, ColumnKind)> {
    let unrecognized = || SimError::table(format!("unrecognized column name {}", name));
    let plain_alias = |alias: &str| -> Result<()> {
        if alias.contains(COLUMN_DELIMITER) {
            Err(unrecognized())
        } else {
            Ok(())
        }
    };

    let (rest, last) = match name.rsplit_once(COLUMN_DELIMITER) {
        None => return Ok((name, ColumnKind::Vector)),
        Some(split) => split,
    };
    if let Some(row) = parse_row(last) {
        if let Some((alias, copy)) = rest.rsplit_once(COLUMN_DELIMITER) {
            if let Some(copy) = parse_copy(copy) {
                plain_alias(alias)?;
                return Ok((alias, ColumnKind::PairRow(copy, row)));
            }
        }
        plain_alias(rest)?;
        return Ok((rest, ColumnKind::MatrixRow(row)));
    }
    if let Some(copy) = parse_copy(last) {
        plain_alias(rest)?;
        return Ok((rest, ColumnKind::PairVector(copy)));
    }
    Err(unrecognized())
}

/// Stacks the columns of `rows`, which must be numbered 0..n exactly once.
fn stack_rows(alias: &str, table: &Table, mut rows: Vec<(usize, usize)>) -> Result<Array2<f64>> {
    rows.sort_unstable();
    for (expected, &(row, _)) in rows.iter().enumerate() {
        if row != expected {
            return Err(SimError::table(format!(
                "rows of {} are not numbered 0..{}",
                alias,
                rows.len()
            )));
        }
    }
    let mut out = Array2::zeros((rows.len(), table.n_samples()));
    for (row, col) in rows {
        out.row_mut(row).assign(&table.data.column(col));
    }
    Ok(out)
}

fn single_column(alias: &str, table: &Table, cols: &[usize]) -> Result<Array1<f64>> {
    match cols {
        [col] => Ok(table.data.column(*col).to_owned()),
        _ => Err(SimError::table(format!(
            "expected exactly one column for {}, found {}",
            alias,
            cols.len()
        ))),
    }
}

/// Rebuilds a values map from a table with encoded column names.
pub fn from_table(table: &Table) -> Result<ValuesMap> {
    let mut groups: BTreeMap<&str, Vec<(ColumnKind, usize)>> = BTreeMap::new();
    for (col, name) in table.columns.iter().enumerate() {
        let (alias, kind) = parse_column_name(name)?;
        groups.entry(alias).or_default().push((kind, col));
    }

    let mut values = ValuesMap::new();
    for (alias, cols) in groups {
        let encoding = cols[0].0.encoding();
        if let Some((kind, _)) = cols.iter().find(|(k, _)| k.encoding() != encoding) {
            return Err(SimError::table(format!(
                "alias {} mixes {} and {} columns",
                alias,
                encoding,
                kind.encoding()
            )));
        }

        let value = match cols[0].0 {
            ColumnKind::Vector => {
                let idx: Vec<usize> = cols.iter().map(|&(_, c)| c).collect();
                NodeValue::Values(Values::Vector(single_column(alias, table, &idx)?))
            }
            ColumnKind::MatrixRow(_) => {
                let rows = cols
                    .iter()
                    .filter_map(|&(k, c)| match k {
                        ColumnKind::MatrixRow(r) => Some((r, c)),
                        _ => None,
                    })
                    .collect();
                NodeValue::Values(Values::Matrix(stack_rows(alias, table, rows)?))
            }
            ColumnKind::PairVector(_) => {
                let copy_cols = |copy: CopyLabel| -> Vec<usize> {
                    cols.iter()
                        .filter(|&&(k, _)| k == ColumnKind::PairVector(copy))
                        .map(|&(_, c)| c)
                        .collect()
                };
                let a = single_column(alias, table, &copy_cols(CopyLabel::A))?;
                let b = single_column(alias, table, &copy_cols(CopyLabel::B))?;
                NodeValue::Haplotype(HaplotypePair::new(a.into(), b.into())?)
            }
            ColumnKind::PairRow(..) => {
                let copy_rows = |copy: CopyLabel| -> Vec<(usize, usize)> {
                    cols.iter()
                        .filter_map(|&(k, c)| match k {
                            ColumnKind::PairRow(kc, r) if kc == copy => Some((r, c)),
                            _ => None,
                        })
                        .collect()
                };
                let a = stack_rows(alias, table, copy_rows(CopyLabel::A))?;
                let b = stack_rows(alias, table, copy_rows(CopyLabel::B))?;
                if a.nrows() != b.nrows() || a.nrows() == 0 {
                    return Err(SimError::table(format!(
                        "haplotype copies of {} have {} and {} rows",
                        alias,
                        a.nrows(),
                        b.nrows()
                    )));
                }
                NodeValue::Haplotype(HaplotypePair::new(a.into(), b.into())?)
            }
        };
        values.insert(alias.to_owned(), value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::error::Error;

    fn example_map() -> Result<ValuesMap, Box<dyn Error>> {
        let mut map = ValuesMap::new();
        map.insert("pheno".into(), arr1(&[1.0, 2.0]).into());
        map.insert("feats".into(), arr2(&[[1.0, 2.0], [3.0, 4.0]]).into());
        map.insert(
            "snp".into(),
            HaplotypePair::new(arr1(&[0.0, 1.0]).into(), arr1(&[1.0, 1.0]).into())?.into(),
        );
        map.insert(
            "region".into(),
            HaplotypePair::new(
                arr2(&[[0.0, 1.0], [1.0, 0.0]]).into(),
                arr2(&[[1.0, 1.0], [0.0, 0.0]]).into(),
            )?
            .into(),
        );
        Ok(map)
    }

    #[test]
    fn test_column_names() -> Result<(), Box<dyn Error>> {
        let table = to_table(&example_map()?)?;
        assert_eq!(
            table.columns(),
            &[
                "feats*-*0",
                "feats*-*1",
                "pheno",
                "region*-*a*-*0",
                "region*-*a*-*1",
                "region*-*b*-*0",
                "region*-*b*-*1",
                "snp*-*a",
                "snp*-*b",
            ]
        );
        assert_eq!(table.n_samples(), 2);
        assert_eq!(table.column("snp*-*a").unwrap().to_vec(), vec![0.0, 1.0]);
        assert_eq!(table.column("feats*-*1").unwrap().to_vec(), vec![3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_round_trip_example() -> Result<(), Box<dyn Error>> {
        let map = example_map()?;
        let table = to_table(&map)?;
        assert_eq!(from_table(&table)?, map);
        assert_eq!(to_table(&from_table(&table)?)?, table);
        Ok(())
    }

    fn random_values(rng: &mut StdRng, n_samples: usize) -> Values {
        if rng.gen_bool(0.5) {
            Array1::from_shape_fn(n_samples, |_| rng.gen_range(-50.0..50.0)).into()
        } else {
            let n_features = rng.gen_range(1..13);
            Array2::from_shape_fn((n_features, n_samples), |_| rng.gen_range(-50.0..50.0)).into()
        }
    }

    /// Aliases mixing in delimiter characters, without the delimiter itself.
    fn random_alias(rng: &mut StdRng, i: usize) -> String {
        const CHARS: &[u8] = b"ab0_*-";
        loop {
            let len = rng.gen_range(1..7);
            let stem: String = (0..len)
                .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
                .collect();
            let alias = format!("{}{}", i, stem);
            if !alias.contains(COLUMN_DELIMITER) {
                return alias;
            }
        }
    }

    #[test]
    fn test_round_trip_random_maps() -> Result<(), Box<dyn Error>> {
        let mut rng = StdRng::seed_from_u64(2023);
        for _ in 0..200 {
            let n_samples = rng.gen_range(1..6);
            let mut map = ValuesMap::new();
            for i in 0..rng.gen_range(1..6) {
                let value: NodeValue = if rng.gen_bool(0.5) {
                    random_values(&mut rng, n_samples).into()
                } else {
                    let a = random_values(&mut rng, n_samples);
                    let b = a.mapv(|_| rng.gen_range(-1.0..1.0));
                    HaplotypePair::new(a, b)?.into()
                };
                map.insert(random_alias(&mut rng, i), value);
            }
            let table = to_table(&map)?;
            assert_eq!(from_table(&table)?, map);
            assert_eq!(to_table(&from_table(&table)?)?, table);
        }
        Ok(())
    }

    #[test]
    fn test_delimited_round_trip() -> Result<(), Box<dyn Error>> {
        let table = to_table(&example_map()?)?;
        let ids = vec!["s1".to_owned(), "s2".to_owned()];
        let mut buf = Vec::new();
        table.write_delimited(&mut buf, b'\t', Some(&ids))?;

        let text = String::from_utf8(buf.clone())?;
        assert!(text.starts_with("sample_id\tfeats*-*0\t"));

        let (read, read_ids) = read_delimited(buf.as_slice(), b'\t', Some(SAMPLE_ID_COLUMN))?;
        assert_eq!(read, table);
        assert_eq!(read_ids, Some(ids));
        Ok(())
    }

    #[test]
    fn test_reader_without_sample_ids() -> Result<(), Box<dyn Error>> {
        let (table, ids) = TableReader::new()
            .sample_id_column(None)
            .from_reader("x,y*-*0\n1,2\n3,4.5\n".as_bytes())?;
        assert_eq!(ids, None);
        assert_eq!(table.data(), &arr2(&[[1.0, 2.0], [3.0, 4.5]]));
        Ok(())
    }

    #[test]
    fn test_reader_rejects_bad_numbers_and_missing_id_column() {
        assert!(TableReader::new()
            .from_reader("sample_id,x\ns1,abc\n".as_bytes())
            .is_err());
        assert!(TableReader::new().from_reader("x\n1\n".as_bytes()).is_err());
    }

    fn table_of(columns: &[&str]) -> Table {
        let data = Array2::zeros((2, columns.len()));
        Table::new(columns.iter().map(|c| c.to_string()).collect(), data).unwrap()
    }

    #[test]
    fn test_from_table_rejects_malformed_columns() {
        let bad = [
            vec!["x*-*c"],
            vec!["x*-*a*-*b"],
            vec!["x*-*a*-*0*-*1"],
            vec!["x", "x*-*0"],
            vec!["x*-*0", "x*-*2"],
            vec!["x*-*a"],
            vec!["x*-*a*-*0", "x*-*a*-*1", "x*-*b*-*0"],
            vec!["x", "x"],
        ];
        for columns in bad.iter() {
            assert!(
                matches!(from_table(&table_of(columns)), Err(SimError::Table { .. })),
                "{:?} accepted",
                columns
            );
        }
    }

    #[test]
    fn test_round_trip_aliases_ending_in_delimiter_chars() -> Result<(), Box<dyn Error>> {
        let mut map = ValuesMap::new();
        map.insert("a*-".into(), arr2(&[[1.0, 2.0], [3.0, 4.0]]).into());
        map.insert("b*".into(), arr1(&[5.0, 6.0]).into());
        map.insert(
            "-*c*-".into(),
            HaplotypePair::new(
                arr2(&[[0.0, 1.0]]).into(),
                arr2(&[[1.0, 1.0]]).into(),
            )?
            .into(),
        );
        map.insert(
            "*-".into(),
            HaplotypePair::new(arr1(&[0.0, 1.0]).into(), arr1(&[1.0, 0.0]).into())?.into(),
        );
        let table = to_table(&map)?;
        assert!(table.columns().contains(&"a*-*-*0".to_owned()));
        assert_eq!(from_table(&table)?, map);
        Ok(())
    }

    #[test]
    fn test_to_table_rejects_values_without_features() -> Result<(), Box<dyn Error>> {
        let mut map = ValuesMap::new();
        map.insert("empty".into(), Array2::<f64>::zeros((0, 2)).into());
        assert!(matches!(to_table(&map), Err(SimError::Table { .. })));

        let mut map = ValuesMap::new();
        let none = || Values::Matrix(Array2::zeros((0, 2)));
        map.insert("pair".into(), HaplotypePair::new(none(), none())?.into());
        assert!(matches!(to_table(&map), Err(SimError::Table { .. })));
        Ok(())
    }

    #[test]
    fn test_to_table_rejects_bad_maps() {
        let mut map = ValuesMap::new();
        map.insert("a*-*b".into(), arr1(&[1.0]).into());
        assert!(to_table(&map).is_err());

        let mut map = ValuesMap::new();
        map.insert("x".into(), arr1(&[1.0]).into());
        map.insert("y".into(), arr1(&[1.0, 2.0]).into());
        assert!(to_table(&map).is_err());
    }
}
