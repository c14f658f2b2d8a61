use thiserror::Error;

/// Core error type for rask operations.
///
/// Resolution and load misses are soft (`NotFound` maps to a 404 at the
/// request surface); `MissingImporter` indicates a caller bug and should fail
/// loudly; `Transform` and `Plugin` abort the current request only;
/// `GraphConsistency` is a defect class that should never fire if the graph
/// contract is upheld.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No plugin resolved or loaded \"{specifier}\"")]
    NotFound { specifier: String },

    #[error("Relative specifier \"{specifier}\" cannot be resolved without an importer")]
    MissingImporter { specifier: String },

    #[error("Plugin \"{plugin}\" failed in {hook}: {message}")]
    Plugin {
        plugin: String,
        hook: String,
        message: String,
    },

    #[error("Transform of {id} failed: {message}")]
    Transform { id: String, message: String },

    #[error("Module graph consistency violation: {0}")]
    GraphConsistency(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn not_found(specifier: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
        }
    }

    #[must_use]
    pub fn transform(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            id: id.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn plugin(
        plugin: impl Into<String>,
        hook: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            hook: hook.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for misses the request surface should answer with a 404 rather
    /// than treat as a server-side failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
