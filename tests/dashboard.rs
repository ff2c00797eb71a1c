use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use arrow::array::{ArrayRef, Float64Array, Int64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use batchview::cache::UploadCache;
use batchview::chart::XField;
use batchview::config::Config;
use batchview::filter::TimeWindow;
use batchview::loader::{DatasetLoader, LoadSource};
use batchview::model::{DatasetId, RawBlob};
use batchview::registry::{list_available, FolderStatus, Source};
use batchview::render::{render, Action, PanelBody, SourcePanel};
use batchview::session::{Session, SourceMode};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(n)
}

fn write_parquet(schema: Schema, columns: Vec<ArrayRef>) -> Result<Vec<u8>> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

/// Daily rows from 2024-01-01 with `Time` stored as a pandas index and four float columns.
fn indexed_file(rows: usize) -> Result<Vec<u8>> {
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    for name in ["open", "high", "low", "close"] {
        fields.push(Field::new(name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(
            (0..rows).map(|i| i as f64).collect::<Vec<_>>(),
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
    let metadata = HashMap::from([(
        "pandas".to_string(),
        r#"{"index_columns": ["Time"], "columns": []}"#.to_string(),
    )]);
    write_parquet(Schema::new(fields).with_metadata(metadata), columns)
}

/// Integer step counter and a float reading; nothing datetime.
fn plain_file(rows: usize) -> Result<Vec<u8>> {
    let schema = Schema::new(vec![
        Field::new("step", DataType::Int64, false),
        Field::new("reading", DataType::Float64, true),
    ]);
    write_parquet(
        schema,
        vec![
            Arc::new(Int64Array::from((0..rows as i64).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(
                (0..rows).map(|i| i as f64 * 0.5).collect::<Vec<_>>(),
            )),
        ],
    )
}

fn upload_both() -> Result<Vec<Action>> {
    Ok(vec![
        Action::Upload {
            files: vec![
                ("a.parquet".to_string(), indexed_file(100)?),
                ("b.parquet".to_string(), plain_file(50)?),
            ],
        },
        Action::Select {
            ids: vec![DatasetId::new("a.parquet"), DatasetId::new("b.parquet")],
        },
    ])
}

#[test]
fn missing_or_non_directory_folders_list_nothing() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();
    for folder in [
        dir.path().join("nope").display().to_string(),
        file.display().to_string(),
        String::new(),
    ] {
        assert!(list_available(Source::Folder(&folder), "parquet").is_empty());
    }
}

#[test]
fn cache_size_counts_latest_bytes_per_name() {
    let mut cache = UploadCache::new();
    cache.merge([
        (DatasetId::new("a.parquet"), RawBlob::new(vec![0u8; 10])),
        (DatasetId::new("b.parquet"), RawBlob::new(vec![0u8; 20])),
    ]);
    cache.merge([(DatasetId::new("a.parquet"), RawBlob::new(vec![0u8; 3]))]);
    assert_eq!(cache.size(), (2, 23));

    let before: Vec<DatasetId> = cache.keys().to_vec();
    let report = cache.merge(std::iter::empty());
    assert!(report.is_empty());
    assert_eq!(cache.size(), (2, 23));
    assert_eq!(cache.keys(), before.as_slice());
}

#[test]
fn identical_bytes_decode_identically() -> Result<()> {
    let bytes = indexed_file(40)?;
    let id = DatasetId::new("a.parquet");
    let first = DatasetLoader::new(None)
        .load(LoadSource::Blob(&RawBlob::new(bytes.clone())), &id)?;
    let mut memoized = DatasetLoader::new(None);
    let blob = RawBlob::new(bytes);
    memoized.load(LoadSource::Blob(&blob), &id)?;
    let second = memoized.load(LoadSource::Blob(&blob), &id)?;
    assert_eq!(*first, *second);
    assert_eq!(memoized.stats(), (1, 1));
    Ok(())
}

#[test]
fn indexed_and_plain_files_get_different_axis_defaults() -> Result<()> {
    let mut session = Session::new(Config::hosted());
    let tree = render(&mut session, upload_both()?);
    assert_eq!(tree.datasets.len(), 2);

    let a = tree.datasets[0].ready().unwrap();
    assert_eq!(a.x_options[0].label, "Index (datetime)");
    assert_eq!(a.x, Some(XField::Index));
    assert_eq!(a.y, ["open", "high", "low"]);

    let b = tree.datasets[1].ready().unwrap();
    assert!(b.x_options.iter().all(|o| o.field != XField::Index));
    assert_eq!(b.x, Some(XField::Column("step".to_string())));
    assert!(b.time.is_none());
    Ok(())
}

#[test]
fn time_window_narrows_then_resets() -> Result<()> {
    let mut session = Session::new(Config::hosted());
    render(&mut session, upload_both()?);
    let id = DatasetId::new("a.parquet");

    let tree = render(
        &mut session,
        vec![Action::SetTimeWindow {
            id: id.clone(),
            window: TimeWindow::new(day(10), day(20)),
        }],
    );
    let a = tree.datasets[0].ready().unwrap();
    let time = a.time.as_ref().unwrap();
    assert!(!time.is_full_range);
    assert_eq!(a.summary.rows, 11);
    assert_eq!(a.chart.as_ref().unwrap().points, 11);

    let tree = render(&mut session, vec![Action::ResetTimeWindow { id }]);
    let a = tree.datasets[0].ready().unwrap();
    assert!(a.time.as_ref().unwrap().is_full_range);
    assert_eq!(a.summary.rows, 100);
    Ok(())
}

#[test]
fn clearing_uploads_empties_the_chart_area() -> Result<()> {
    let mut session = Session::new(Config::hosted());
    render(&mut session, upload_both()?);
    let tree = render(&mut session, vec![Action::ClearUploads]);
    assert!(tree.datasets.is_empty());
    assert!(session.selection().selected().is_empty());
    assert_eq!(tree.status.cached_files, 0);
    Ok(())
}

#[test]
fn folder_mode_lists_and_renders_files() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("a.parquet"), indexed_file(30)?)?;
    fs::write(dir.path().join("broken.parquet"), b"junk")?;
    fs::write(dir.path().join("notes.txt"), b"skip")?;
    let folder = dir.path().display().to_string();

    let mut session = Session::new(Config::default());
    let tree = render(
        &mut session,
        vec![
            Action::SetFolder { folder },
            Action::Select {
                ids: vec![DatasetId::new("a.parquet"), DatasetId::new("broken.parquet")],
            },
        ],
    );
    match &tree.source {
        SourcePanel::Path { status, available, .. } => {
            assert_eq!(*status, FolderStatus::Found(2));
            assert_eq!(available.len(), 2);
        }
        other => panic!("unexpected source panel {:?}", other),
    }
    assert_eq!(tree.datasets[0].ready().unwrap().summary.rows, 30);
    assert!(matches!(tree.datasets[1].body, PanelBody::Errored { .. }));
    Ok(())
}

#[test]
fn switching_modes_keeps_uploads() -> Result<()> {
    let mut session = Session::new(Config::default());
    let tree = render(
        &mut session,
        vec![
            Action::SetSourceMode { mode: SourceMode::Upload },
            Action::Upload {
                files: vec![("a.parquet".to_string(), indexed_file(5)?)],
            },
            Action::Select { ids: vec![DatasetId::new("a.parquet")] },
            Action::SetSourceMode { mode: SourceMode::Path },
            Action::SetSourceMode { mode: SourceMode::Upload },
        ],
    );
    assert!(tree.datasets.is_empty());
    assert_eq!(tree.status.cached_files, 1);
    Ok(())
}

#[test]
fn rewriting_a_folder_file_keeps_one_decoded_copy() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("a.parquet");
    let mut session = Session::new(Config::default());
    fs::write(&path, indexed_file(5)?)?;
    render(
        &mut session,
        vec![
            Action::SetFolder {
                folder: dir.path().display().to_string(),
            },
            Action::Select {
                ids: vec![DatasetId::new("a.parquet")],
            },
        ],
    );
    for rows in 6..10 {
        fs::write(&path, indexed_file(rows)?)?;
        let tree = render(&mut session, vec![]);
        assert_eq!(tree.datasets[0].ready().unwrap().summary.rows, rows);
    }
    assert_eq!(session.loader().len(), 1);

    fs::remove_file(&path)?;
    render(&mut session, vec![]);
    assert!(session.loader().is_empty());
    Ok(())
}
