//! Data model shared by every pipeline stage.
//!
//! A [`Dataset`] is decoded once and then only ever read; filtering builds a
//! new dataset from row positions instead of editing the original.

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{DashError, Result};

/// Key of a dataset within a session: the file name, extension included.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name shown on tabs: the file name without the dataset extension.
    pub fn display_name(&self, extension: &str) -> String {
        let suffix = format!(".{}", extension);
        self.0.replace(&suffix, "")
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DatasetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Uploaded bytes for one dataset. Cloning shares the buffer.
#[derive(Clone)]
pub struct RawBlob {
    bytes: Bytes,
    digest: String,
}

impl RawBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let digest = hex::encode(Sha256::digest(&bytes));
        Self { bytes, digest }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 of the content, lowercase hex.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Debug for RawBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlob")
            .field("len", &self.bytes.len())
            .field("digest", &self.digest)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Datetime,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Missing values are NaN.
    Numeric(Vec<f64>),
    Datetime(Vec<Option<NaiveDateTime>>),
    /// Anything else, kept as display strings for inspection only.
    Other {
        dtype: String,
        values: Vec<Option<String>>,
    },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Datetime(v) => v.len(),
            ColumnData::Other { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Datetime(_) => ColumnKind::Datetime,
            ColumnData::Other { .. } => ColumnKind::Other,
        }
    }

    pub fn type_label(&self) -> String {
        match self {
            ColumnData::Numeric(_) => "float64".to_string(),
            ColumnData::Datetime(_) => "datetime64".to_string(),
            ColumnData::Other { dtype, .. } => dtype.clone(),
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_nan()).count(),
            ColumnData::Datetime(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Other { values, .. } => values.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Datetime(v) => ColumnData::Datetime(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Other { dtype, values } => ColumnData::Other {
                dtype: dtype.clone(),
                values: rows.iter().map(|&r| values[r].clone()).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }
}

/// Datetime row index. Null entries never fall inside a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct DatetimeIndex {
    pub name: Option<String>,
    pub values: Vec<Option<NaiveDateTime>>,
}

impl DatetimeIndex {
    pub fn new(name: Option<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self { name, values }
    }

    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut it = self.values.iter().flatten();
        let first = *it.next()?;
        Some(it.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
    }

    /// True when non-null values never decrease and no nulls are present.
    pub fn is_sorted(&self) -> bool {
        self.values.iter().all(|v| v.is_some())
            && self.values.windows(2).all(|w| w[0] <= w[1])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    id: DatasetId,
    index: Option<DatetimeIndex>,
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset, checking that the index and every column share one row count.
    pub fn new(id: DatasetId, index: Option<DatetimeIndex>, columns: Vec<Column>) -> Result<Self> {
        let rows = match (&index, columns.first()) {
            (Some(ix), _) => ix.values.len(),
            (None, Some(col)) => col.data.len(),
            (None, None) => 0,
        };
        for col in &columns {
            if col.data.len() != rows {
                return Err(DashError::decode(
                    id.as_str(),
                    format!(
                        "column `{}` has {} rows, expected {}",
                        col.name,
                        col.data.len(),
                        rows
                    ),
                ));
            }
        }
        Ok(Self {
            id,
            index,
            columns,
            rows,
        })
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn index(&self) -> Option<&DatetimeIndex> {
        self.index.as_ref()
    }

    pub fn has_datetime_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn index_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.index.as_ref().and_then(DatetimeIndex::bounds)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind() == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.names_of_kind(ColumnKind::Numeric)
    }

    pub fn datetime_columns(&self) -> Vec<String> {
        self.names_of_kind(ColumnKind::Datetime)
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// New dataset holding the given row positions, in the given order.
    pub fn take(&self, rows: &[usize]) -> Dataset {
        Dataset {
            id: self.id.clone(),
            index: self.index.as_ref().map(|ix| DatetimeIndex {
                name: ix.name.clone(),
                values: rows.iter().map(|&r| ix.values[r]).collect(),
            }),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(rows)))
                .collect(),
            rows: rows.len(),
        }
    }
}
