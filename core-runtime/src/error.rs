use thiserror::Error;

/// Runtime infrastructure errors (logging setup, event plumbing).
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid runtime configuration, e.g. a malformed log filter.
    #[error("Invalid runtime configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
