use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::Io(std::io::Error::new(e.kind(), e.to_string())),
            DbError::Parse(s) => DbError::Parse(s.clone()),
            DbError::Schema(s) => DbError::Schema(s.clone()),
            DbError::Resource(s) => DbError::Resource(s.clone()),
            DbError::Execution(s) => DbError::Execution(s.clone()),
            DbError::InvalidArgument(s) => DbError::InvalidArgument(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
