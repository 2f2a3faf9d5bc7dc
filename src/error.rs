use thiserror::Error;

/// Reasons a compile-and-run request fails before any compiler runs
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("No source files were submitted")]
    NoFiles,

    #[error("Too many files: {count} (limit {limit})")]
    TooManyFiles { count: usize, limit: usize },

    #[error("File '{name}' is too large: {size} bytes (limit {limit})")]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("Invalid file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("Duplicate file name '{name}'")]
    DuplicateFileName { name: String },

    #[error("Unsupported language: {language}")]
    UnknownLanguage { language: String },

    #[error("Invalid entry point '{entry_point}'")]
    InvalidEntryPoint { entry_point: String },

    #[error("Failed to stage source files: {0}")]
    Staging(#[source] std::io::Error),
}

impl RequestError {
    /// Whether the caller sent something unacceptable, as opposed to a host failure
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Staging(_))
    }
}
