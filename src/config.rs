use serde::{Deserialize, Serialize};

pub const DEFAULT_FOLDER_PLACEHOLDER: &str = "C:/path/to/parquet/folder";

/// Where the dashboard runs. Decides which data sources a session may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Files are read straight from the host filesystem or uploaded.
    Local,
    /// Upload only; the host filesystem is not the user's.
    Hosted,
}

impl DeployMode {
    pub fn from_env() -> Self {
        match std::env::var("BATCHVIEW_DEPLOY").as_deref() {
            Ok("hosted") | Ok("cloud") => DeployMode::Hosted,
            _ => DeployMode::Local,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Local => "local",
            DeployMode::Hosted => "hosted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub deploy: DeployMode,
    /// File suffix (without the dot) that marks a dataset, matched case-insensitively.
    pub extension: String,
    pub folder_placeholder: String,
    /// Numeric columns preselected on the y-axis.
    pub default_y_fields: usize,
    /// Keep every n-th row before charting; 1 keeps everything.
    pub downsample_step: usize,
    /// Datetime column promoted to the index when the file has no index metadata.
    pub index_column: Option<String>,
    /// Rows shown in each dataset's data preview.
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deploy: DeployMode::Local,
            extension: "parquet".to_string(),
            folder_placeholder: DEFAULT_FOLDER_PLACEHOLDER.to_string(),
            default_y_fields: 3,
            downsample_step: 1,
            index_column: None,
            preview_rows: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            deploy: DeployMode::from_env(),
            extension: std::env::var("BATCHVIEW_EXTENSION")
                .ok()
                .map(|v| v.trim_start_matches('.').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.extension),
            folder_placeholder: std::env::var("BATCHVIEW_FOLDER_PLACEHOLDER")
                .unwrap_or(defaults.folder_placeholder),
            default_y_fields: std::env::var("BATCHVIEW_DEFAULT_Y")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_y_fields),
            downsample_step: std::env::var("BATCHVIEW_DOWNSAMPLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(defaults.downsample_step),
            index_column: std::env::var("BATCHVIEW_INDEX_COLUMN")
                .ok()
                .filter(|v| !v.is_empty()),
            preview_rows: std::env::var("BATCHVIEW_PREVIEW_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.preview_rows),
        }
    }

    pub fn hosted() -> Self {
        Self {
            deploy: DeployMode::Hosted,
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self, folder: &str) -> bool {
        folder == self.folder_placeholder
    }
}
