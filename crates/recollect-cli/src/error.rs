use std::fmt;

/// Error reported to the operator; the message is printed as-is
#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CliError {}

impl From<&str> for CliError {
    fn from(message: &str) -> Self {
        CliError(message.to_string())
    }
}

impl From<recollect::RecollectError> for CliError {
    fn from(e: recollect::RecollectError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("Failed to render JSON: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
