use std::path::PathBuf;

/// Errors raised by the compile and load paths.
///
/// Records that a spectrum collaborator reports as unavailable are not
/// errors; they are skipped by the accumulator and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot find dataset {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("column '{0}' not present")]
    MissingColumn(String),

    #[error("unexpected layout: {0}")]
    Schema(String),

    #[error("buffer capacity {capacity} exceeded: record needs rows {cursor}..{}", cursor + rows)]
    CapacityExceeded {
        capacity: usize,
        cursor: usize,
        rows: usize,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
