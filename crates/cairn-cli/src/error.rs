use cairn::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] EngineError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("job file '{path}' is not usable: {source}", path = path.display())]
    JobFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid job configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
