/// Domain errors raised while validating and routing chat events.
///
/// Infrastructure failures (store, presence directory, backplane) have their
/// own error types in the crates that own those concerns.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Connection has not identified itself")]
    Unidentified,

    #[error("Sender '{claimed}' does not match connection identity '{actual}'")]
    IdentityMismatch { claimed: String, actual: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code sent back to clients in error acks.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Unidentified | CoreError::IdentityMismatch { .. } => "IDENTITY_ERROR",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_variants_share_a_code() {
        assert_eq!(CoreError::Unidentified.code(), "IDENTITY_ERROR");
        let mismatch = CoreError::IdentityMismatch {
            claimed: "bob".into(),
            actual: "alice".into(),
        };
        assert_eq!(mismatch.code(), "IDENTITY_ERROR");
        assert!(mismatch.to_string().contains("'bob'"));
    }

    #[test]
    fn validation_code() {
        assert_eq!(
            CoreError::Validation("x".into()).code(),
            "VALIDATION_ERROR"
        );
    }
}
