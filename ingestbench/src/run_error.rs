use crate::exit_codes::ExitCode;

/// Why a command stopped before reaching a verdict.
#[derive(Debug)]
pub enum RunError {
    /// Refused before any request was sent.
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "invalid input: {e:#}"),
            Self::RuntimeError(e) => write!(f, "error: {e:#}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_the_context_chain() {
        let err = RunError::InvalidInput(
            anyhow::anyhow!("p95_ms must be positive").context("unusable baseline: base.json"),
        );
        assert_eq!(
            err.to_string(),
            "invalid input: unusable baseline: base.json: p95_ms must be positive"
        );
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
    }
}
