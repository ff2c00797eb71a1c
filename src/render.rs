//! One render pass: `(Session, Vec<Action>) -> RenderTree`
//!
//! Actions are applied in order, the selection is reconciled against the
//! registry, then every selected dataset is loaded, filtered and charted into
//! its own panel. A failure in one panel never stops the others.
//!
//! The tree is plain data; a front end serializes it and draws it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::megabytes;
use crate::chart::{self, AxisOption, ChartSpec, XField};
use crate::config::DeployMode;
use crate::filter::{self, TimeWindow};
use crate::logging::{self, obj, v_str, Domain, ProfileScope};
use crate::model::{Dataset, DatasetId};
use crate::registry::{probe_folder, FolderStatus};
use crate::session::{AxisChoice, Session, SourceMode};
use crate::summary::{self, ColumnInfo, DataPreview, DatasetSummary, FieldStats};

/// A user interaction, applied before the tree is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SetSourceMode { mode: SourceMode },
    SetFolder { folder: String },
    /// `(file name, file bytes)` pairs from one upload batch.
    Upload { files: Vec<(String, Vec<u8>)> },
    ClearUploads,
    Select { ids: Vec<DatasetId> },
    SetTimeWindow { id: DatasetId, window: TimeWindow },
    ResetTimeWindow { id: DatasetId },
    SetXAxis { id: DatasetId, field: XField },
    SetYFields { id: DatasetId, fields: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPanel {
    pub deploy: DeployMode,
    pub mode: SourceMode,
    pub selected: usize,
    pub cached_files: usize,
    pub cached_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedFile {
    pub id: DatasetId,
    pub size_mb: f64,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SourcePanel {
    Path {
        folder: String,
        status: FolderStatus,
        message: String,
        available: Vec<DatasetId>,
    },
    Upload {
        files: Vec<CachedFile>,
        total_mb: f64,
    },
}

/// Slider state for a dataset with a datetime index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeControl {
    pub bounds: TimeWindow,
    pub window: TimeWindow,
    pub is_full_range: bool,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadyPanel {
    pub x_options: Vec<AxisOption>,
    pub x: Option<XField>,
    pub y_options: Vec<String>,
    pub y: Vec<String>,
    pub time: Option<TimeControl>,
    pub chart: Option<ChartSpec>,
    /// Shown in place of the chart.
    pub prompt: Option<String>,
    pub summary: DatasetSummary,
    pub stats: Vec<FieldStats>,
    pub columns: Vec<ColumnInfo>,
    pub preview: DataPreview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PanelBody {
    Errored { kind: String, message: String },
    Ready(Box<ReadyPanel>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetPanel {
    pub id: DatasetId,
    pub label: String,
    pub body: PanelBody,
}

impl DatasetPanel {
    pub fn ready(&self) -> Option<&ReadyPanel> {
        match &self.body {
            PanelBody::Ready(panel) => Some(panel),
            PanelBody::Errored { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderTree {
    pub status: StatusPanel,
    pub source: SourcePanel,
    pub notices: Vec<Notice>,
    pub datasets: Vec<DatasetPanel>,
}

/// Apply `actions` to `session` and build the page.
pub fn render(session: &mut Session, actions: Vec<Action>) -> RenderTree {
    let _scope = ProfileScope::with_context("render", &[("actions", json!(actions.len()))]);
    let mut notices = Vec::new();

    for action in actions {
        apply(session, action, &mut notices);
    }

    let removed = session.prune_selection();
    session.prune_loaded_files();
    if !removed.is_empty() {
        let names: Vec<&str> = removed.iter().map(|id| id.as_str()).collect();
        notices.push(Notice::new(
            NoticeLevel::Warning,
            format!("No longer available: {}", names.join(", ")),
        ));
    }

    let source = source_panel(session);
    let selected = session.selection().selected().to_vec();
    if selected.is_empty() {
        notices.push(Notice::new(
            NoticeLevel::Info,
            "Please select one or more files to visualize.",
        ));
    }
    let datasets = selected.iter().map(|id| dataset_panel(session, id)).collect();

    let (cached_files, cached_bytes) = session.uploads().size();
    RenderTree {
        status: StatusPanel {
            deploy: session.config().deploy,
            mode: session.selection().mode(),
            selected: selected.len(),
            cached_files,
            cached_mb: megabytes(cached_bytes),
        },
        source,
        notices,
        datasets,
    }
}

fn apply(session: &mut Session, action: Action, notices: &mut Vec<Notice>) {
    match action {
        Action::SetSourceMode { mode } => match session.set_source_mode(mode) {
            Ok(true) => notices.push(Notice::new(
                NoticeLevel::Info,
                format!(
                    "Switched to {} method. Your selections have been cleared, but uploaded files remain cached.",
                    mode.label()
                ),
            )),
            Ok(false) => {}
            Err(err) => notices.push(Notice::new(NoticeLevel::Warning, err.to_string())),
        },
        Action::SetFolder { folder } => {
            session.set_folder(&folder);
        }
        Action::Upload { files } => {
            let report = session.upload(files);
            if !report.is_empty() {
                let (count, bytes) = session.uploads().size();
                notices.push(Notice::new(
                    NoticeLevel::Success,
                    format!("{} files in cache ({:.2} MB)", count, megabytes(bytes)),
                ));
            }
        }
        Action::ClearUploads => {
            session.clear_uploads();
            notices.push(Notice::new(NoticeLevel::Success, "Cleared all uploaded files"));
        }
        Action::Select { ids } => {
            let rejected = session.select(ids);
            for id in rejected {
                notices.push(Notice::new(
                    NoticeLevel::Warning,
                    format!("{} is not available from the current source", id),
                ));
            }
        }
        Action::SetTimeWindow { id, window } => session.set_time_window(&id, window),
        Action::ResetTimeWindow { id } => session.reset_time_window(&id),
        Action::SetXAxis { id, field } => session.set_x_axis(&id, field),
        Action::SetYFields { id, fields } => session.set_y_fields(&id, fields),
    }
}

fn source_panel(session: &Session) -> SourcePanel {
    let cfg = session.config();
    match session.selection().mode() {
        SourceMode::Path => {
            let folder = session.selection().folder().to_string();
            let status = probe_folder(&folder, cfg);
            let available = match status {
                FolderStatus::Found(_) => session.available(),
                _ => Vec::new(),
            };
            SourcePanel::Path {
                message: status.message(&cfg.extension),
                folder,
                status,
                available,
            }
        }
        SourceMode::Upload => {
            let selection = session.selection();
            let files = session
                .uploads()
                .iter()
                .map(|(id, blob)| CachedFile {
                    id: id.clone(),
                    size_mb: megabytes(blob.len()),
                    selected: selection.contains(id),
                })
                .collect();
            SourcePanel::Upload {
                files,
                total_mb: session.uploads().total_mb(),
            }
        }
    }
}

fn dataset_panel(session: &mut Session, id: &DatasetId) -> DatasetPanel {
    let label = id.display_name(&session.config().extension);
    let body = match session.load(id) {
        Ok(dataset) => PanelBody::Ready(Box::new(ready_panel(session, &dataset))),
        Err(err) => {
            logging::warn(
                Domain::Render,
                "panel_errored",
                obj(&[
                    ("dataset", v_str(id.as_str())),
                    ("kind", v_str(err.kind())),
                    ("reason", v_str(&err.to_string())),
                ]),
            );
            PanelBody::Errored {
                kind: err.kind().to_string(),
                message: format!("Could not process {}: {}", id, err),
            }
        }
    };
    DatasetPanel {
        id: id.clone(),
        label,
        body,
    }
}

fn ready_panel(session: &mut Session, dataset: &Arc<Dataset>) -> ReadyPanel {
    let id = dataset.id();
    let window = session.window_for(dataset);
    let view = filter::apply(dataset, window.as_ref());

    let choice = session.axis_choice(id);
    let axes = chart::resolve_axes(
        dataset,
        choice.x.as_ref(),
        choice.y.as_deref(),
        session.config().default_y_fields,
    );
    if !axes.pruned.is_empty() {
        session.set_axis_choice(
            id,
            AxisChoice {
                x: choice.x.as_ref().and(axes.x.clone()),
                y: choice.y.as_ref().map(|_| axes.y.clone()),
            },
        );
    }

    let y_options = dataset.numeric_columns();
    let (chart, prompt) = if y_options.is_empty() {
        (None, Some("No numeric columns found for plotting.".to_string()))
    } else if axes.y.is_empty() {
        (None, Some("Please select at least one column to plot on the Y-axis.".to_string()))
    } else {
        match &axes.x {
            None => (None, Some("No suitable columns found for X-axis.".to_string())),
            Some(x) => match chart::build(
                &view.clone().downsample(session.config().downsample_step),
                x,
                &axes.y,
            ) {
                Ok(spec) => (Some(spec), None),
                Err(err) => (None, Some(format!("Could not create plot: {}", err))),
            },
        }
    };

    let time = match (TimeWindow::full(dataset), window) {
        (Some(bounds), Some(window)) => Some(TimeControl {
            bounds,
            window,
            is_full_range: view.is_full_range,
            status: summary::filter_status(&view),
        }),
        _ => None,
    };

    ReadyPanel {
        x_options: chart::x_axis_options(dataset),
        x: axes.x,
        stats: summary::describe(&view.data, &axes.y),
        y_options,
        y: axes.y,
        time,
        chart,
        prompt,
        summary: summary::summarize(&view, dataset),
        columns: summary::column_info(&view.data),
        preview: summary::preview(&view, session.config().preview_rows),
    }
}
