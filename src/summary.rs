//! Read-only facts about a view: row counts, date ranges, column info and
//! `describe()`-style statistics for the plotted fields.

use serde::Serialize;

use crate::chart::group_thousands;
use crate::filter::View;
use crate::model::{ColumnData, Dataset};

const DAY_FMT: &str = "%Y-%m-%d";
const CELL_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

fn date_range(dataset: &Dataset) -> Option<DateRange> {
    dataset.index_bounds().map(|(lo, hi)| DateRange {
        start: lo.format(DAY_FMT).to_string(),
        end: hi.format(DAY_FMT).to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub total_rows: usize,
    pub filtered: bool,
    pub columns: usize,
    /// Range of the view; `None` without a datetime index or with zero rows.
    pub date_range: Option<DateRange>,
    /// Range of the unfiltered dataset, only reported when the view is filtered.
    pub full_range: Option<DateRange>,
}

pub fn summarize(view: &View, source: &Dataset) -> DatasetSummary {
    let filtered = view.is_filtered();
    DatasetSummary {
        rows: view.window_rows,
        total_rows: view.source_rows,
        filtered,
        columns: view.data.columns().len(),
        date_range: date_range(&view.data),
        full_range: if filtered { date_range(source) } else { None },
    }
}

/// Status line shown under the time-range control.
pub fn filter_status(view: &View) -> String {
    if view.is_full_range {
        return "Showing full time range".to_string();
    }
    let pct = if view.source_rows == 0 {
        0.0
    } else {
        view.window_rows as f64 / view.source_rows as f64 * 100.0
    };
    format!(
        "Time filter active: Showing {} of {} total rows ({:.1}%)",
        group_thousands(view.window_rows),
        group_thousands(view.source_rows),
        pct
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub non_null: usize,
    pub nulls: usize,
}

pub fn column_info(dataset: &Dataset) -> Vec<ColumnInfo> {
    dataset
        .columns()
        .iter()
        .map(|c| {
            let nulls = c.data.null_count();
            ColumnInfo {
                name: c.name.clone(),
                dtype: c.data.type_label(),
                non_null: c.data.len() - nulls,
                nulls,
            }
        })
        .collect()
}

/// Leading rows of a view as display strings, index first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPreview {
    pub columns: Vec<String>,
    /// `None` cells are nulls.
    pub rows: Vec<Vec<Option<String>>>,
    /// Rows in the view the preview was cut from.
    pub total: usize,
    pub caption: Option<String>,
}

pub fn preview(view: &View, limit: usize) -> DataPreview {
    let data = &view.data;
    let shown = data.rows().min(limit);
    let mut columns = Vec::with_capacity(data.columns().len() + 1);
    let mut rows: Vec<Vec<Option<String>>> = vec![Vec::new(); shown];

    if let Some(index) = data.index() {
        columns.push(index.name.clone().unwrap_or_else(|| "index".to_string()));
        for (row, value) in rows.iter_mut().zip(&index.values) {
            row.push(value.map(|t| t.format(CELL_FMT).to_string()));
        }
    }
    for column in data.columns() {
        columns.push(column.name.clone());
        for (i, row) in rows.iter_mut().enumerate() {
            row.push(cell(&column.data, i));
        }
    }

    let caption = view.is_filtered().then(|| {
        format!(
            "Showing filtered data ({} of {} rows)",
            group_thousands(view.window_rows),
            group_thousands(view.source_rows)
        )
    });
    DataPreview {
        columns,
        rows,
        total: data.rows(),
        caption,
    }
}

fn cell(data: &ColumnData, i: usize) -> Option<String> {
    match data {
        ColumnData::Numeric(v) => v.get(i).filter(|x| !x.is_nan()).map(f64::to_string),
        ColumnData::Datetime(v) => v
            .get(i)
            .copied()
            .flatten()
            .map(|t| t.format(CELL_FMT).to_string()),
        ColumnData::Other { values, .. } => values.get(i).cloned().flatten(),
    }
}

/// Summary statistics over the non-NaN values of one numeric field.
/// Undefined statistics are NaN (serialized as `null`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStats {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

/// Statistics for each of `fields` that names a numeric column; others are skipped.
pub fn describe(dataset: &Dataset, fields: &[String]) -> Vec<FieldStats> {
    fields
        .iter()
        .filter_map(|name| dataset.numeric(name).map(|v| field_stats(name, v)))
        .collect()
}

fn field_stats(name: &str, values: &[f64]) -> FieldStats {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = if n == 0 {
        f64::NAN
    } else {
        sorted.iter().sum::<f64>() / n as f64
    };
    // sample standard deviation (ddof = 1)
    let std = if n < 2 {
        f64::NAN
    } else {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    };
    FieldStats {
        field: name.to_string(),
        count: n,
        mean,
        std,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.50),
        p75: quantile(&sorted, 0.75),
        max: sorted.last().copied().unwrap_or(f64::NAN),
    }
}

/// Linear interpolation between closest ranks over sorted input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
