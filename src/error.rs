use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid period key '{0}': expected YYYY-MM")]
    InvalidPeriodKey(String),

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("A goal already exists for branch {branch} in {month:02}/{year}")]
    DuplicateGoal {
        branch: String,
        year: i32,
        month: u32,
    },

    #[error("No goal with id {0}")]
    GoalNotFound(String),

    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("The {0} file is empty")]
    EmptyUpload(String),

    #[error("Missing required columns in the {domain} file: {columns}")]
    MissingColumns { domain: String, columns: String },

    #[error("Invalid value for '{column}' in row {row}: \"{value}\"")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
