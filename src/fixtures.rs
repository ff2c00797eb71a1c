//! Test datasets and their parquet encodings.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;

use crate::model::{Column, ColumnData, Dataset, DatasetId, DatetimeIndex};

pub fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(n)
}

/// `rows` daily rows from 2024-01-01 with numeric columns `c0..`; `c{k}[i] = i * (k + 1)`.
pub fn daily_dataset(id: &str, rows: usize, numeric: usize) -> Dataset {
    let index = DatetimeIndex::new(
        Some("Time".to_string()),
        (0..rows as i64).map(|i| Some(day(i))).collect(),
    );
    let columns = (0..numeric)
        .map(|k| {
            Column::new(
                format!("c{}", k),
                ColumnData::Numeric((0..rows).map(|i| (i * (k + 1)) as f64).collect()),
            )
        })
        .collect();
    Dataset::new(DatasetId::new(id), Some(index), columns).unwrap()
}

pub fn flat_dataset(id: &str, rows: usize) -> Dataset {
    Dataset::new(
        DatasetId::new(id),
        None,
        vec![
            Column::new("x", ColumnData::Numeric((0..rows).map(|i| i as f64).collect())),
            Column::new("y", ColumnData::Numeric((0..rows).map(|i| (i * i) as f64).collect())),
            Column::new(
                "label",
                ColumnData::Other {
                    dtype: "string".to_string(),
                    values: (0..rows).map(|i| Some(format!("r{}", i))).collect(),
                },
            ),
        ],
    )
    .unwrap()
}

/// Daily index `Time`, a second datetime column `seen` (index + 12h) and numeric `v`.
pub fn events_dataset(id: &str, rows: usize) -> Dataset {
    let index = DatetimeIndex::new(
        Some("Time".to_string()),
        (0..rows as i64).map(|i| Some(day(i))).collect(),
    );
    Dataset::new(
        DatasetId::new(id),
        Some(index),
        vec![
            Column::new(
                "seen",
                ColumnData::Datetime(
                    (0..rows as i64)
                        .map(|i| Some(day(i) + Duration::hours(12)))
                        .collect(),
                ),
            ),
            Column::new("v", ColumnData::Numeric((0..rows).map(|i| i as f64).collect())),
        ],
    )
    .unwrap()
}

fn encode(schema: Schema, columns: Vec<ArrayRef>) -> Vec<u8> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }
    buf
}

fn pandas_metadata(index: &str) -> HashMap<String, String> {
    HashMap::from([(
        "pandas".to_string(),
        format!(r#"{{"index_columns": ["{}"], "column_indexes": [], "columns": []}}"#, index),
    )])
}

/// Parquet bytes shaped like a pandas export: `Time` stored as the index, numeric `c0..`.
pub fn daily_parquet(rows: usize, numeric: usize) -> Vec<u8> {
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    for k in 0..numeric {
        fields.push(Field::new(format!("c{}", k), DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(
            (0..rows).map(|i| (i * (k + 1)) as f64).collect::<Vec<_>>(),
        )));
    }
    fields.push(Field::new(
        "Time",
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    ));
    columns.push(Arc::new(TimestampMillisecondArray::from(
        (0..rows as i64)
            .map(|i| day(i).and_utc().timestamp_millis())
            .collect::<Vec<_>>(),
    )));
    encode(
        Schema::new(fields).with_metadata(pandas_metadata("Time")),
        columns,
    )
}

/// Parquet bytes without any datetime data: integer `x`, float `y`, string `label`.
pub fn flat_parquet(rows: usize) -> Vec<u8> {
    let schema = Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Float64, true),
        Field::new("label", DataType::Utf8, true),
    ]);
    encode(
        schema,
        vec![
            Arc::new(Int64Array::from((0..rows as i64).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(
                (0..rows).map(|i| Some((i * i) as f64)).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                (0..rows).map(|i| Some(format!("r{}", i))).collect::<Vec<_>>(),
            )),
        ],
    )
}

/// Parquet bytes with no index metadata: tz-aware `Time` (`+02:00`), `Date32` `day`, float `v`.
/// `Time` and `day` both hold `day(i)` in UTC.
pub fn stamped_parquet(rows: usize) -> Vec<u8> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let schema = Schema::new(vec![
        Field::new(
            "Time",
            DataType::Timestamp(TimeUnit::Millisecond, Some("+02:00".into())),
            false,
        ),
        Field::new("day", DataType::Date32, true),
        Field::new("v", DataType::Float64, true),
    ]);
    encode(
        schema,
        vec![
            Arc::new(
                TimestampMillisecondArray::from(
                    (0..rows as i64)
                        .map(|i| day(i).and_utc().timestamp_millis())
                        .collect::<Vec<_>>(),
                )
                .with_timezone("+02:00"),
            ),
            Arc::new(Date32Array::from(
                (0..rows as i64)
                    .map(|i| (day(i).date() - epoch).num_days() as i32)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                (0..rows).map(|i| i as f64).collect::<Vec<_>>(),
            )),
        ],
    )
}
