use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DialogueResult<T> = Result<T, DialogueError>;

impl From<serde_json::Error> for DialogueError {
    fn from(err: serde_json::Error) -> Self {
        DialogueError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DialogueError {
    fn from(err: toml::de::Error) -> Self {
        DialogueError::Config(err.to_string())
    }
}

impl From<std::io::Error> for DialogueError {
    fn from(err: std::io::Error) -> Self {
        DialogueError::Config(err.to_string())
    }
}
