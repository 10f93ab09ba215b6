use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read PDF: {0}")]
    Pdf(String),

    #[error("document looks scanned / image-only, no text to extract")]
    ScannedDocument,

    #[error("table {table}: expected {expected} rows after rebuild, found {actual}")]
    RowCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("invalid schema change: {0}")]
    InvalidSchemaChange(String),

    #[error("table {0} does not exist")]
    MissingTable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
