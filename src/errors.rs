use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Source connection failed: {0}")]
    SourceConnection(String),

    #[error("Partition enumeration failed: {0}")]
    Enumeration(String),

    #[error("Failed to extract partition '{partition}': {reason}")]
    Extraction { partition: String, reason: String },

    #[error("Failed to ensure storage prefix '{key}': {reason}")]
    PathEnsure { key: String, reason: String },

    #[error("Object store operation failed for key '{key}': {reason}")]
    Store { key: String, reason: String },

    #[error("Queue send failed: {0}")]
    Notification(String),

    #[error("Serde JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid partition name: '{0}'")]
    InvalidPartition(String),
}

impl BackupError {
    pub fn store(key: impl Into<String>, reason: impl ToString) -> Self {
        BackupError::Store {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
