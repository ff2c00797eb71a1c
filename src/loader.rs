//! Decodes parquet content into [`Dataset`]s, memoized by content identity.
//!
//! Uploaded blobs are keyed by `(name, sha256)`, files by
//! `(path, length, mtime)`. Failures are never memoized so the next render
//! retries them.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use arrow::error::ArrowError;
use arrow::temporal_conversions::as_datetime;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::NaiveDateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;
use serde::Deserialize;
use serde_json::json;

use crate::error::{DashError, Result};
use crate::logging::{self, log_decode, log_decode_failure, obj, v_str, Domain, ProfileScope};
use crate::model::{Column, ColumnData, Dataset, DatasetId, DatetimeIndex, RawBlob};

#[derive(Debug, Clone, Copy)]
pub enum LoadSource<'a> {
    Blob(&'a RawBlob),
    Path(&'a Path),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoKey {
    Content {
        id: DatasetId,
        digest: String,
    },
    File {
        path: PathBuf,
        len: u64,
        modified: Option<SystemTime>,
    },
}

impl MemoKey {
    fn label(&self) -> String {
        match self {
            MemoKey::Content { digest, .. } => format!("sha256:{}", &digest[..digest.len().min(12)]),
            MemoKey::File { path, len, .. } => format!("file:{}:{}", path.display(), len),
        }
    }
}

#[derive(Debug, Default)]
pub struct DatasetLoader {
    memo: HashMap<MemoKey, Arc<Dataset>>,
    index_column: Option<String>,
    hits: u64,
    decodes: u64,
}

impl DatasetLoader {
    pub fn new(index_column: Option<String>) -> Self {
        Self {
            index_column,
            ..Self::default()
        }
    }

    /// Decoded dataset for `source`, reusing an earlier decode of the same content.
    pub fn load(&mut self, source: LoadSource<'_>, id: &DatasetId) -> Result<Arc<Dataset>> {
        let key = match source {
            LoadSource::Blob(blob) => MemoKey::Content {
                id: id.clone(),
                digest: blob.digest().to_string(),
            },
            LoadSource::Path(path) => {
                let meta = std::fs::metadata(path)?;
                MemoKey::File {
                    path: path.to_path_buf(),
                    len: meta.len(),
                    modified: meta.modified().ok(),
                }
            }
        };
        if let Some(hit) = self.memo.get(&key) {
            self.hits += 1;
            return Ok(hit.clone());
        }

        let _scope = ProfileScope::with_context("decode", &[("dataset", v_str(id.as_str()))]);
        let hint = self.index_column.as_deref();
        let decoded = match source {
            LoadSource::Blob(blob) => decode(blob.bytes().clone(), id, hint),
            LoadSource::Path(path) => File::open(path)
                .map_err(DashError::from)
                .and_then(|file| decode(file, id, hint)),
        };
        match decoded {
            Ok(dataset) => {
                self.decodes += 1;
                log_decode(
                    id.as_str(),
                    &key.label(),
                    dataset.rows(),
                    dataset.columns().len(),
                    dataset.has_datetime_index(),
                );
                let dataset = Arc::new(dataset);
                if let MemoKey::File { path, .. } = &key {
                    // an older version of the same file is dead once the new one decodes
                    self.memo.retain(|k, _| !matches!(k, MemoKey::File { path: p, .. } if p == path));
                }
                self.memo.insert(key, dataset.clone());
                Ok(dataset)
            }
            Err(err) => {
                log_decode_failure(id.as_str(), &err.to_string());
                Err(err)
            }
        }
    }

    /// Drop memoized uploads whose content is no longer in `live`.
    pub fn retain_blobs<'a>(&mut self, live: impl IntoIterator<Item = &'a str>) {
        let live: HashSet<&str> = live.into_iter().collect();
        let before = self.memo.len();
        self.memo.retain(|key, _| match key {
            MemoKey::Content { digest, .. } => live.contains(digest.as_str()),
            MemoKey::File { .. } => true,
        });
        let dropped = before - self.memo.len();
        if dropped > 0 {
            logging::debug(
                Domain::Loader,
                "memo_pruned",
                obj(&[("dropped", json!(dropped)), ("kept", json!(self.memo.len()))]),
            );
        }
    }

    /// Drop memoized files whose path is not in `live`.
    pub fn retain_paths<'a>(&mut self, live: impl IntoIterator<Item = &'a Path>) {
        let live: HashSet<&Path> = live.into_iter().collect();
        let before = self.memo.len();
        self.memo.retain(|key, _| match key {
            MemoKey::Content { .. } => true,
            MemoKey::File { path, .. } => live.contains(path.as_path()),
        });
        let dropped = before - self.memo.len();
        if dropped > 0 {
            logging::debug(
                Domain::Loader,
                "memo_pruned",
                obj(&[
                    ("dropped", json!(dropped)),
                    ("kept", json!(self.memo.len())),
                    ("source", v_str("path")),
                ]),
            );
        }
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    /// `(memo hits, real decodes)`
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.decodes)
    }
}

/// Decode parquet from any chunk reader: `bytes::Bytes` for uploads, `File` for paths.
pub fn decode<R: ChunkReader + 'static>(
    reader: R,
    id: &DatasetId,
    index_column: Option<&str>,
) -> Result<Dataset> {
    let fail = |e: &dyn std::fmt::Display| DashError::decode(id.as_str(), e);

    let builder = ParquetRecordBatchReaderBuilder::try_new(reader).map_err(|e| fail(&e))?;
    let schema = builder.schema().clone();
    let batches = builder
        .build()
        .map_err(|e| fail(&e))?
        .collect::<std::result::Result<Vec<_>, ArrowError>>()
        .map_err(|e| fail(&e))?;
    let batch = concat_batches(&schema, &batches).map_err(|e| fail(&e))?;

    let stored_index = pandas_index_columns(schema.metadata());
    let mut index = None;
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let data = convert_column(array).map_err(|e| fail(&e))?;
        if stored_index.iter().any(|name| name == field.name()) {
            // A single datetime index becomes the row index; other stored indexes stay hidden.
            if stored_index.len() == 1 {
                if let ColumnData::Datetime(values) = data {
                    index = Some(DatetimeIndex::new(Some(field.name().clone()), values));
                }
            }
            continue;
        }
        columns.push(Column::new(field.name().clone(), data));
    }

    if index.is_none() && stored_index.is_empty() {
        if let Some(hint) = index_column {
            index = promote_index(&mut columns, hint);
        }
    }

    Dataset::new(id.clone(), index, columns)
}

fn promote_index(columns: &mut Vec<Column>, name: &str) -> Option<DatetimeIndex> {
    let pos = columns
        .iter()
        .position(|c| c.name == name && matches!(c.data, ColumnData::Datetime(_)))?;
    match columns.remove(pos).data {
        ColumnData::Datetime(values) => Some(DatetimeIndex::new(Some(name.to_string()), values)),
        _ => None,
    }
}

#[derive(Deserialize)]
struct PandasMeta {
    #[serde(default)]
    index_columns: Vec<serde_json::Value>,
}

/// Column names a pandas writer stored as the index. Range indexes are
/// recorded as objects and have no column, so they are skipped.
fn pandas_index_columns(metadata: &HashMap<String, String>) -> Vec<String> {
    metadata
        .get("pandas")
        .and_then(|raw| serde_json::from_str::<PandasMeta>(raw).ok())
        .map(|meta| {
            meta.index_columns
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn convert_column(array: &ArrayRef) -> std::result::Result<ColumnData, ArrowError> {
    let data = match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            ColumnData::Datetime(datetimes::<TimestampSecondType>(array))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            ColumnData::Datetime(datetimes::<TimestampMillisecondType>(array))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            ColumnData::Datetime(datetimes::<TimestampMicrosecondType>(array))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            ColumnData::Datetime(datetimes::<TimestampNanosecondType>(array))
        }
        DataType::Date32 => ColumnData::Datetime(datetimes::<Date32Type>(array)),
        DataType::Date64 => ColumnData::Datetime(datetimes::<Date64Type>(array)),
        dt if dt.is_numeric() => {
            let floats = cast(array, &DataType::Float64)?;
            ColumnData::Numeric(
                floats
                    .as_primitive::<Float64Type>()
                    .iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect(),
            )
        }
        other => {
            let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
            let values = (0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        None
                    } else {
                        Some(formatter.value(i).to_string())
                    }
                })
                .collect();
            ColumnData::Other {
                dtype: dtype_label(other),
                values,
            }
        }
    };
    Ok(data)
}

fn datetimes<T>(array: &ArrayRef) -> Vec<Option<NaiveDateTime>>
where
    T: ArrowPrimitiveType,
    T::Native: Into<i64>,
{
    array
        .as_primitive::<T>()
        .iter()
        .map(|v| v.and_then(|v| as_datetime::<T>(v.into())))
        .collect()
}

fn dtype_label(dt: &DataType) -> String {
    match dt {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "string".to_string(),
        DataType::Boolean => "bool".to_string(),
        other => other.to_string().to_lowercase(),
    }
}
