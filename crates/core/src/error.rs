use thiserror::Error;

/// Validation failures detected before any upstream call is made.
///
/// All variants map to a 4xx response; none of them is ever retried.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuardError {
    #[error("the target query parameter is missing")]
    MissingTarget,

    #[error("the target is not a valid absolute URL")]
    InvalidTarget,

    #[error("only http and https targets are supported")]
    UnsupportedScheme,

    #[error("access to this address is forbidden")]
    ForbiddenAddress,
}

pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_plain_text() {
        assert!(GuardError::MissingTarget.to_string().contains("missing"));
        assert!(GuardError::ForbiddenAddress.to_string().contains("forbidden"));
    }
}
