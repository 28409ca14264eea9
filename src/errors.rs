//! All errors that can occur in the argsim library.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum GenealogyError {
    ConfigurationError(String),
    InvariantViolation(String),
    ReadError(String),
    WriteError(String),
}

pub type Result<T> = std::result::Result<T, GenealogyError>;

impl fmt::Display for GenealogyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GenealogyError::ConfigurationError(message) => {
                write!(f, "ConfigurationError: {}", message)
            }
            GenealogyError::InvariantViolation(message) => {
                write!(f, "InvariantViolation: {}", message)
            }
            GenealogyError::ReadError(message) => write!(f, "ReadError: {}", message),
            GenealogyError::WriteError(message) => write!(f, "WriteError: {}", message),
        }
    }
}

impl std::error::Error for GenealogyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_variant() {
        let error = GenealogyError::InvariantViolation("siblings 3 and 4 not paired".to_string());
        assert_eq!(
            error.to_string(),
            "InvariantViolation: siblings 3 and 4 not paired"
        );
    }
}
