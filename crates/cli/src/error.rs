use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid date: {0}")]
    Date(#[from] chrono::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote error: {0}")]
    Remote(#[from] store::RemoteError),
    #[error("{0}")]
    Store(#[from] store::StoreError),
    #[error("terminal error: {0}")]
    Terminal(String),
}
