//! Per-user session state: what is selected, where it comes from, and the
//! time windows and axis choices made for each dataset.
//!
//! Lifecycle: created empty on first access, mutated by user actions,
//! selection cleared on a source-mode switch or a real folder change.
//! Sessions share nothing with each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::{MergeReport, UploadCache};
use crate::chart::XField;
use crate::config::{Config, DeployMode};
use crate::error::{DashError, Result};
use crate::filter::TimeWindow;
use crate::loader::{DatasetLoader, LoadSource};
use crate::logging::{self, log_pruned, obj, v_str, Domain};
use crate::model::{Dataset, DatasetId, RawBlob};
use crate::registry::{self, dataset_path, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Path,
    Upload,
}

impl SourceMode {
    pub fn label(&self) -> &'static str {
        match self {
            SourceMode::Path => "File Path",
            SourceMode::Upload => "File Upload",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Path => "path",
            SourceMode::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionState {
    selected: Vec<DatasetId>,
    mode: SourceMode,
    folder: String,
}

impl SelectionState {
    pub fn selected(&self) -> &[DatasetId] {
        &self.selected
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.selected.contains(id)
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }
}

#[derive(Debug, Clone)]
struct WindowSlot {
    /// Index `(min, max)` the window was made for; unknown until first render.
    bounds: Option<TimeWindow>,
    window: TimeWindow,
}

/// Axis fields chosen for one dataset. `None` means "use the default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisChoice {
    pub x: Option<XField>,
    pub y: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct Session {
    cfg: Config,
    selection: SelectionState,
    uploads: UploadCache,
    loader: DatasetLoader,
    windows: HashMap<DatasetId, WindowSlot>,
    axes: HashMap<DatasetId, AxisChoice>,
}

impl Session {
    pub fn new(cfg: Config) -> Self {
        let mode = match cfg.deploy {
            DeployMode::Local => SourceMode::Path,
            DeployMode::Hosted => SourceMode::Upload,
        };
        Self {
            selection: SelectionState {
                selected: Vec::new(),
                mode,
                folder: cfg.folder_placeholder.clone(),
            },
            uploads: UploadCache::new(),
            loader: DatasetLoader::new(cfg.index_column.clone()),
            windows: HashMap::new(),
            axes: HashMap::new(),
            cfg,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn uploads(&self) -> &UploadCache {
        &self.uploads
    }

    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    // -------------------------------------------------------------------------
    // Source
    // -------------------------------------------------------------------------

    /// Switch data source. Returns whether the mode changed; a change clears the selection.
    pub fn set_source_mode(&mut self, mode: SourceMode) -> Result<bool> {
        if mode == SourceMode::Path && self.cfg.deploy == DeployMode::Hosted {
            logging::warn(
                Domain::Session,
                "mode_refused",
                obj(&[("mode", v_str(mode.as_str()))]),
            );
            return Err(DashError::ModeUnavailable("path"));
        }
        if mode == self.selection.mode {
            return Ok(false);
        }
        self.selection.mode = mode;
        self.clear_selection("mode_switch");
        logging::info(
            Domain::Session,
            "mode_switched",
            obj(&[("mode", v_str(mode.as_str()))]),
        );
        Ok(true)
    }

    /// Point path mode at `folder`. While in path mode, moving to anything but the
    /// placeholder clears the selection.
    pub fn set_folder(&mut self, folder: &str) -> bool {
        if folder == self.selection.folder {
            return false;
        }
        self.selection.folder = folder.to_string();
        if self.selection.mode == SourceMode::Path && !self.cfg.is_placeholder(folder) {
            self.clear_selection("folder_changed");
        }
        true
    }

    /// Every dataset the current source offers.
    pub fn available(&self) -> Vec<DatasetId> {
        let source = match self.selection.mode {
            SourceMode::Path => Source::Folder(&self.selection.folder),
            SourceMode::Upload => Source::Uploads(&self.uploads),
        };
        registry::list_available(source, &self.cfg.extension)
    }

    // -------------------------------------------------------------------------
    // Uploads
    // -------------------------------------------------------------------------

    pub fn upload<I>(&mut self, batch: I) -> MergeReport
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let report = self.uploads.merge(
            batch
                .into_iter()
                .map(|(name, bytes)| (DatasetId::new(name), RawBlob::new(bytes))),
        );
        if !report.replaced.is_empty() {
            self.loader.retain_blobs(self.uploads.digests());
        }
        report
    }

    pub fn clear_uploads(&mut self) {
        self.uploads.clear();
        self.loader.retain_blobs(std::iter::empty());
        logging::info(Domain::Cache, "cleared", obj(&[]));
        self.prune_selection();
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Replace the selection. Ids the registry cannot resolve are dropped and returned.
    pub fn select<I>(&mut self, ids: I) -> Vec<DatasetId>
    where
        I: IntoIterator<Item = DatasetId>,
    {
        let available = self.available();
        let mut selected = Vec::new();
        let mut rejected = Vec::new();
        for id in ids {
            if !available.contains(&id) {
                rejected.push(id);
            } else if !selected.contains(&id) {
                selected.push(id);
            }
        }
        self.selection.selected = selected;
        logging::debug(
            Domain::Session,
            "selected",
            obj(&[
                ("count", json!(self.selection.selected.len())),
                ("rejected", json!(rejected.len())),
            ]),
        );
        rejected
    }

    /// Drop selected ids the registry no longer resolves.
    pub fn prune_selection(&mut self) -> Vec<DatasetId> {
        let available = self.available();
        let mut removed = Vec::new();
        self.selection.selected.retain(|id| {
            let keep = available.contains(id);
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        let names: Vec<String> = removed.iter().map(|id| id.to_string()).collect();
        log_pruned("unresolvable", &names);
        removed
    }

    fn clear_selection(&mut self, reason: &str) {
        let names: Vec<String> = self.selection.selected.drain(..).map(|id| id.to_string()).collect();
        log_pruned(reason, &names);
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Decode `id` from the current source, memoized.
    pub fn load(&mut self, id: &DatasetId) -> Result<Arc<Dataset>> {
        match self.selection.mode {
            SourceMode::Upload => {
                let blob = self.uploads.get(id).ok_or_else(|| DashError::RegistryUnavailable {
                    path: id.to_string(),
                    reason: "not in upload cache".to_string(),
                })?;
                self.loader.load(LoadSource::Blob(blob), id)
            }
            SourceMode::Path => {
                let path = dataset_path(&self.selection.folder, id);
                self.loader.load(LoadSource::Path(&path), id)
            }
        }
    }

    /// Forget decoded files the current folder no longer lists.
    pub fn prune_loaded_files(&mut self) {
        let live: Vec<PathBuf> = match self.selection.mode {
            SourceMode::Path => self
                .available()
                .iter()
                .map(|id| dataset_path(&self.selection.folder, id))
                .collect(),
            SourceMode::Upload => Vec::new(),
        };
        self.loader.retain_paths(live.iter().map(PathBuf::as_path));
    }

    // -------------------------------------------------------------------------
    // Time windows
    // -------------------------------------------------------------------------

    pub fn time_window(&self, id: &DatasetId) -> Option<TimeWindow> {
        self.windows.get(id).map(|slot| slot.window)
    }

    pub fn set_time_window(&mut self, id: &DatasetId, window: TimeWindow) {
        match self.windows.get_mut(id) {
            Some(slot) => slot.window = window,
            None => {
                self.windows.insert(
                    id.clone(),
                    WindowSlot {
                        bounds: None,
                        window,
                    },
                );
            }
        }
    }

    /// Back to the dataset's full range.
    pub fn reset_time_window(&mut self, id: &DatasetId) {
        match self.windows.get(id).and_then(|slot| slot.bounds) {
            Some(bounds) => self.set_time_window(id, bounds),
            None => {
                self.windows.remove(id);
            }
        }
    }

    /// Window to render `dataset` with. Created as `(min, max)` on first use and
    /// reset when the dataset's own bounds move. `None` without a datetime index.
    pub fn window_for(&mut self, dataset: &Dataset) -> Option<TimeWindow> {
        let full = TimeWindow::full(dataset)?;
        let id = dataset.id();
        let slot = self.windows.entry(id.clone()).or_insert(WindowSlot {
            bounds: Some(full),
            window: full,
        });
        match slot.bounds {
            Some(bounds) if bounds == full => {}
            None => slot.bounds = Some(full),
            Some(_) => {
                slot.bounds = Some(full);
                slot.window = full;
                logging::info(
                    Domain::Filter,
                    "window_reset",
                    obj(&[("dataset", v_str(id.as_str()))]),
                );
            }
        }
        Some(slot.window)
    }

    // -------------------------------------------------------------------------
    // Axes
    // -------------------------------------------------------------------------

    pub fn axis_choice(&self, id: &DatasetId) -> AxisChoice {
        self.axes.get(id).cloned().unwrap_or_default()
    }

    pub fn set_x_axis(&mut self, id: &DatasetId, field: XField) {
        self.axes.entry(id.clone()).or_default().x = Some(field);
    }

    pub fn set_y_fields(&mut self, id: &DatasetId, fields: Vec<String>) {
        self.axes.entry(id.clone()).or_default().y = Some(fields);
    }

    pub fn set_axis_choice(&mut self, id: &DatasetId, choice: AxisChoice) {
        self.axes.insert(id.clone(), choice);
    }
}
