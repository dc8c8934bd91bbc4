use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvisorError {
    /// A required field is missing, negative, or carries an unrecognized value.
    #[error("invalid input for `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    /// The policy tables break one of their invariants.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

impl AdvisorError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_policy(reason: impl Into<String>) -> Self {
        Self::InvalidPolicy(reason.into())
    }

    /// Name of the offending input field, if this is an input error.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { field, .. } => Some(field),
            Self::InvalidPolicy(_) => None,
        }
    }
}
