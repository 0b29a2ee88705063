#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signal-cli timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("signal-cli exited with code {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

impl Error {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ExitStatus { .. } => "exit_status",
            Self::Spawn { .. } => "spawn",
            Self::Io(_) => "io",
            Self::InvalidRecipient(_) => "invalid_recipient",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_budget_and_exit_details() {
        assert_eq!(
            Error::Timeout { timeout_ms: 30_000 }.to_string(),
            "signal-cli timed out after 30000ms"
        );
        assert_eq!(
            Error::ExitStatus {
                code: 3,
                stderr: "User is not registered.".into(),
            }
            .to_string(),
            "signal-cli exited with code 3: User is not registered."
        );
    }
}
