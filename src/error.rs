use thiserror::Error;

/// Failure modes the pipeline knows how to surface.
///
/// None of these escape [`crate::render::render`]; each one is turned into
/// panel state or a notice by the component that can act on it.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("source unavailable: {path} ({reason})")]
    RegistryUnavailable { path: String, reason: String },

    #[error("could not decode {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("field `{field}` is not a {expected} field of {id}")]
    Field {
        id: String,
        field: String,
        expected: &'static str,
    },

    #[error("{0} source is not available in a hosted deployment")]
    ModeUnavailable(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DashError>;

impl DashError {
    pub fn decode(id: &str, reason: impl ToString) -> Self {
        DashError::Decode {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn field(id: &str, field: &str, expected: &'static str) -> Self {
        DashError::Field {
            id: id.to_string(),
            field: field.to_string(),
            expected,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DashError::RegistryUnavailable { .. } => "registry_unavailable",
            DashError::Decode { .. } => "decode",
            DashError::Field { .. } => "field",
            DashError::ModeUnavailable(_) => "mode_unavailable",
            DashError::Io(_) => "io",
        }
    }
}
