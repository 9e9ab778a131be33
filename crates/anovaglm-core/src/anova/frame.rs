//! In-memory columnar frame: the source dataset AnovaGLM reads from.
//!
//! Categorical columns store a fixed domain of labels plus one optional
//! level index per row; numeric columns store `f64` with NaN meaning
//! "missing". Columns are immutable once the frame is built.

use std::collections::HashMap;

use crate::error::{AnovaGlmError, Result};

/// A categorical column: ordered domain and per-row level indices.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    domain: Vec<String>,
    codes: Vec<Option<u32>>,
}

impl CategoricalColumn {
    /// Build from an explicit domain and level indices.
    pub fn new(domain: Vec<String>, codes: Vec<Option<u32>>) -> Result<Self> {
        let k = domain.len();
        if let Some(bad) = codes.iter().flatten().find(|&&c| c as usize >= k) {
            return Err(AnovaGlmError::InvalidValue(format!(
                "level index {} out of range for a domain of {} labels",
                bad, k
            )));
        }
        Ok(Self { domain, codes })
    }

    /// Factorize string labels. Levels are numbered in first-seen order.
    pub fn from_labels<S: AsRef<str>>(labels: &[Option<S>]) -> Self {
        let mut lookup: HashMap<&str, u32> = HashMap::new();
        let mut domain = Vec::new();
        let mut codes = Vec::with_capacity(labels.len());
        for label in labels {
            let code = label.as_ref().map(|s| {
                let key: &str = s.as_ref();
                *lookup.entry(key).or_insert_with(|| {
                    domain.push(key.to_string());
                    (domain.len() - 1) as u32
                })
            });
            codes.push(code);
        }
        Self { domain, codes }
    }

    /// Encode labels against a caller-supplied domain, keeping its order.
    pub fn with_domain<S: AsRef<str>>(domain: Vec<String>, labels: &[Option<S>]) -> Result<Self> {
        let lookup: HashMap<&str, u32> = domain
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i as u32))
            .collect();
        let mut codes = Vec::with_capacity(labels.len());
        for label in labels {
            match label {
                None => codes.push(None),
                Some(s) => {
                    let key: &str = s.as_ref();
                    match lookup.get(key) {
                        Some(&c) => codes.push(Some(c)),
                        None => {
                            return Err(AnovaGlmError::InvalidValue(format!(
                                "label '{}' is not in the declared domain",
                                key
                            )))
                        }
                    }
                }
            }
        }
        Ok(Self { domain, codes })
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Level index at `row`, `None` when missing.
    pub fn get(&self, row: usize) -> Option<u32> {
        self.codes.get(row).copied().flatten()
    }

    pub fn codes(&self) -> &[Option<u32>] {
        &self.codes
    }

    pub fn n_missing(&self) -> usize {
        self.codes.iter().filter(|c| c.is_none()).count()
    }

    pub fn level_index(&self, label: &str) -> Option<u32> {
        self.domain.iter().position(|l| l == label).map(|i| i as u32)
    }

    /// Most frequent level; ties go to the earlier level. `None` if every row is missing.
    pub fn mode(&self) -> Option<u32> {
        let mut counts = vec![0usize; self.domain.len()];
        for c in self.codes.iter().flatten() {
            counts[*c as usize] += 1;
        }
        let (best, &n) = counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|&(_, &n)| n)?;
        (n > 0).then_some(best as u32)
    }
}

/// A numeric column; NaN marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    values: Vec<f64>,
}

impl NumericColumn {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn from_options(values: &[Option<f64>]) -> Self {
        Self {
            values: values.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `row`, `None` when missing (NaN).
    pub fn get(&self, row: usize) -> Option<f64> {
        self.values.get(row).copied().filter(|v| !v.is_nan())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn n_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Categorical(CategoricalColumn),
    Numeric(NumericColumn),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical(c) => c.len(),
            Column::Numeric(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_categorical(&self) -> Option<&CategoricalColumn> {
        match self {
            Column::Categorical(c) => Some(c),
            Column::Numeric(_) => None,
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericColumn> {
        match self {
            Column::Numeric(c) => Some(c),
            Column::Categorical(_) => None,
        }
    }
}

impl From<CategoricalColumn> for Column {
    fn from(c: CategoricalColumn) -> Self {
        Column::Categorical(c)
    }
}

impl From<NumericColumn> for Column {
    fn from(c: NumericColumn) -> Self {
        Column::Numeric(c)
    }
}

/// Ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style.
    pub fn with_column(mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<Self> {
        self.add_column(name, column)?;
        Ok(self)
    }

    pub fn add_column(&mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<()> {
        let name = name.into();
        let column = column.into();
        if self.names.contains(&name) {
            return Err(AnovaGlmError::InvalidValue(format!(
                "duplicate column name '{}'",
                name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(AnovaGlmError::DimensionMismatch(format!(
                    "column '{}' has {} rows but the frame has {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }
}
