use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for merge/dedup operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Error type shared across catalog enumeration, ingestion, merging and deduplication.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Underlying I/O error (e.g. permission denied while opening a source).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV source unit error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "excel")]
    /// Workbook source error (feature-gated behind `excel`).
    #[error("workbook error: {0}")]
    Excel(#[from] calamine::Error),

    /// The tabular container handed to the catalog does not exist or is unreadable.
    #[error("container not found: {}", path.display())]
    ContainerNotFound { path: PathBuf },

    /// A source unit could not be read (missing file, corrupt sheet, malformed rows).
    #[error("source unit '{unit}' unreadable: {message}")]
    SourceRead { unit: String, message: String },

    /// A projection references a column the source unit does not have.
    #[error("projection cannot be applied to '{unit}': {message}")]
    Projection { unit: String, message: String },

    /// A projection expression could not be parsed or evaluated.
    #[error("invalid projection expression '{expr}': {message}")]
    Expression { expr: String, message: String },

    /// A unit's projected column set disagrees with the first successfully merged unit's.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Aggregate failure surfaced by the merge coordinator, wrapping the first-observed
    /// underlying cause. After this is returned no partial state remains in the store.
    #[error("merge failed at unit '{unit}': {cause}")]
    MergeFailed {
        unit: String,
        #[source]
        cause: Box<MergeError>,
    },

    /// Deduplication was requested with zero projection entries.
    #[error("projection must contain at least one entry (the dedup key)")]
    EmptyProjection,

    /// The caller cancelled the operation via its [`crate::merge::CancelToken`].
    #[error("operation cancelled")]
    Cancelled,

    /// A store operation referenced a relation name that does not exist.
    #[error("unknown relation '{name}'")]
    UnknownRelation { name: String },

    /// A store operation tried to create a relation name that already exists.
    #[error("relation '{name}' already exists")]
    DuplicateRelation { name: String },
}
