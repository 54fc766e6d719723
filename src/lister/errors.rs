//! Lister Error Types
//!
//! Failures of a single enumeration call. None of them leave partial state
//! behind: a failed listing is never merged.

/// Lister error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Failed to parse {field}: {value:?}")]
    Parse { field: &'static str, value: String },
}

impl ListError {
    pub(crate) fn parse(field: &'static str, value: &str) -> Self {
        ListError::Parse {
            field,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ListError::Protocol("unexpected header".into());
        assert_eq!(err.to_string(), "Protocol violation: unexpected header");

        let err = ListError::parse("size", "12 parsecs");
        assert_eq!(err.to_string(), "Failed to parse size: \"12 parsecs\"");
    }
}
