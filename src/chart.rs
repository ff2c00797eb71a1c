//! Line-chart specifications built from a filtered view.
//!
//! The output is plain data meant to be handed to a plotting front end as
//! JSON; no drawing happens here.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{DashError, Result};
use crate::filter::View;
use crate::logging::{self, obj, v_str, Domain};
use crate::model::{ColumnData, ColumnKind, Dataset};

/// Field plotted along the x-axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XField {
    Index,
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisOption {
    pub field: XField,
    pub label: String,
}

/// X-axis candidates: the datetime index, then datetime columns, then numeric columns.
pub fn x_axis_options(dataset: &Dataset) -> Vec<AxisOption> {
    let mut options = Vec::new();
    if dataset.has_datetime_index() {
        options.push(AxisOption {
            field: XField::Index,
            label: "Index (datetime)".to_string(),
        });
    }
    for name in dataset.datetime_columns() {
        options.push(AxisOption {
            label: format!("{} (datetime)", name),
            field: XField::Column(name),
        });
    }
    for name in dataset.numeric_columns() {
        options.push(AxisOption {
            label: format!("{} (numeric)", name),
            field: XField::Column(name),
        });
    }
    options
}

pub fn default_x(dataset: &Dataset) -> Option<XField> {
    x_axis_options(dataset).into_iter().next().map(|o| o.field)
}

/// First `count` numeric columns.
pub fn default_y(dataset: &Dataset, count: usize) -> Vec<String> {
    dataset.numeric_columns().into_iter().take(count).collect()
}

fn check_x(dataset: &Dataset, field: &XField) -> Result<()> {
    let ok = match field {
        XField::Index => dataset.has_datetime_index(),
        XField::Column(name) => matches!(
            dataset.column(name).map(|c| c.kind()),
            Some(ColumnKind::Datetime) | Some(ColumnKind::Numeric)
        ),
    };
    if ok {
        Ok(())
    } else {
        let name = match field {
            XField::Index => "index",
            XField::Column(name) => name.as_str(),
        };
        Err(DashError::field(dataset.id().as_str(), name, "datetime or numeric"))
    }
}

/// Axis choice after dropping fields the dataset no longer has.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAxes {
    pub x: Option<XField>,
    pub y: Vec<String>,
    /// Requested fields that were dropped.
    pub pruned: Vec<String>,
}

/// Reconcile a stored axis choice with `dataset`. `None` means "use the default".
pub fn resolve_axes(
    dataset: &Dataset,
    x: Option<&XField>,
    y: Option<&[String]>,
    default_count: usize,
) -> ResolvedAxes {
    let mut pruned = Vec::new();
    let x = match x {
        Some(field) if check_x(dataset, field).is_ok() => Some(field.clone()),
        Some(field) => {
            pruned.push(match field {
                XField::Index => "index".to_string(),
                XField::Column(name) => name.clone(),
            });
            default_x(dataset)
        }
        None => default_x(dataset),
    };
    let y = match y {
        Some(fields) => fields
            .iter()
            .filter(|name| {
                let keep = dataset.numeric(name).is_some();
                if !keep {
                    pruned.push((*name).clone());
                }
                keep
            })
            .cloned()
            .collect(),
        None => default_y(dataset, default_count),
    };
    if !pruned.is_empty() {
        logging::info(
            Domain::Chart,
            "axes_pruned",
            obj(&[
                ("dataset", v_str(dataset.id().as_str())),
                (
                    "fields",
                    serde_json::Value::Array(pruned.iter().map(|f| v_str(f)).collect()),
                ),
            ]),
        );
    }
    ResolvedAxes { x, y, pruned }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum XValues {
    Datetime(Vec<Option<NaiveDateTime>>),
    Numeric(Vec<f64>),
}

impl XValues {
    pub fn len(&self) -> usize {
        match self {
            XValues::Datetime(v) => v.len(),
            XValues::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub x: XValues,
    /// NaN serializes as `null`, which plots as a gap.
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub series: Vec<Series>,
    pub points: usize,
    pub filtered: bool,
    /// Every `sampled_step`-th windowed row is plotted.
    pub sampled_step: usize,
}

impl ChartSpec {
    /// No y fields were chosen; the caller shows a prompt instead of a chart.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Build a line chart of `y_fields` against `x_field` over `view`.
pub fn build(view: &View, x_field: &XField, y_fields: &[String]) -> Result<ChartSpec> {
    let data = &view.data;
    let id = data.id().as_str();
    check_x(data, x_field)?;
    for name in y_fields {
        if data.numeric(name).is_none() {
            return Err(DashError::field(id, name, "numeric"));
        }
    }

    let (x, x_title) = match x_field {
        XField::Index => {
            let values = data.index().map(|ix| ix.values.clone()).unwrap_or_default();
            (XValues::Datetime(values), "Index".to_string())
        }
        XField::Column(name) => {
            let values = match data.column(name).map(|c| &c.data) {
                Some(ColumnData::Datetime(v)) => XValues::Datetime(v.clone()),
                Some(ColumnData::Numeric(v)) => XValues::Numeric(v.clone()),
                _ => return Err(DashError::field(id, name, "datetime or numeric")),
            };
            (values, name.clone())
        }
    };

    let series = y_fields
        .iter()
        .filter_map(|name| {
            data.numeric(name).map(|y| Series {
                name: name.clone(),
                x: x.clone(),
                y: y.to_vec(),
            })
        })
        .collect();

    let points = view.rows();
    let filtered = view.is_filtered();
    let status = if filtered {
        format!(" - Filtered ({} points)", group_thousands(points))
    } else {
        format!(" ({} points)", group_thousands(points))
    };
    Ok(ChartSpec {
        title: format!("Line Graph for {}{}", id, status),
        x_title,
        y_title: "Values".to_string(),
        series,
        points,
        filtered,
        sampled_step: view.step,
    })
}

/// `1234567` -> `"1,234,567"`
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
