//! Time-window slicing and down-sampling of loaded datasets.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::logging::log_window;
use crate::model::Dataset;

/// Inclusive bounds on a dataset's datetime index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// `(min, max)` of the dataset's index, if it has a datetime index with values.
    pub fn full(dataset: &Dataset) -> Option<Self> {
        dataset.index_bounds().map(|(lo, hi)| Self::new(lo, hi))
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }
}

/// What the chart builder gets: a possibly narrowed dataset plus how it relates
/// to the dataset it came from.
#[derive(Debug, Clone)]
pub struct View {
    pub data: Arc<Dataset>,
    pub is_full_range: bool,
    /// Row count of the unfiltered dataset.
    pub source_rows: usize,
    /// Row count after windowing, before any down-sampling.
    pub window_rows: usize,
    /// Every `step`-th windowed row is kept; 1 means all of them.
    pub step: usize,
}

impl View {
    pub fn full(data: Arc<Dataset>) -> Self {
        let source_rows = data.rows();
        Self {
            data,
            is_full_range: true,
            source_rows,
            window_rows: source_rows,
            step: 1,
        }
    }

    pub fn rows(&self) -> usize {
        self.data.rows()
    }

    /// True when the time window dropped rows. Down-sampling alone does not count.
    pub fn is_filtered(&self) -> bool {
        self.window_rows != self.source_rows
    }

    /// Keep every `step`-th row, starting with the first. `step <= 1` is a no-op.
    pub fn downsample(self, step: usize) -> View {
        if step <= 1 || self.rows() == 0 {
            return self;
        }
        let rows: Vec<usize> = (0..self.rows()).step_by(step).collect();
        View {
            data: Arc::new(self.data.take(&rows)),
            step: self.step * step,
            ..self
        }
    }
}

/// Narrow `dataset` to `window`.
///
/// Datasets without a datetime index, a missing window, or a window equal to
/// the index's own `(min, max)` come back untouched with `is_full_range` set.
/// Anything else is the inclusive slice, which may be empty.
pub fn apply(dataset: &Arc<Dataset>, window: Option<&TimeWindow>) -> View {
    let (Some(index), Some(window)) = (dataset.index(), window) else {
        return View::full(dataset.clone());
    };
    if TimeWindow::full(dataset).as_ref() == Some(window) {
        return View::full(dataset.clone());
    }

    let rows: Vec<usize> = if index.is_sorted() {
        let values = &index.values;
        let lo = values.partition_point(|v| v.map_or(true, |t| t < window.start));
        let hi = values.partition_point(|v| v.map_or(true, |t| t <= window.end));
        (lo..hi.max(lo)).collect()
    } else {
        index
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.map_or(false, |t| window.contains(t)))
            .map(|(i, _)| i)
            .collect()
    };

    let view = View {
        data: Arc::new(dataset.take(&rows)),
        is_full_range: false,
        source_rows: dataset.rows(),
        window_rows: rows.len(),
        step: 1,
    };
    log_window(dataset.id().as_str(), view.rows(), view.source_rows, false);
    view
}
