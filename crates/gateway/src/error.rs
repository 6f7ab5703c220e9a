use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    thiserror::Error,
};

use cocoon_core::GuardError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Connection, DNS, or TLS failure reaching the target. Protocol-level
    /// 4xx/5xx from the upstream are not errors; they are relayed as-is.
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Guard(GuardError::ForbiddenAddress) => StatusCode::FORBIDDEN,
            Self::Guard(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Plain text, with the underlying reason kept for operator diagnosis.
        (status, format!("ERROR: {self}")).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn guard_errors_are_4xx() {
        assert_eq!(status_of(GuardError::MissingTarget.into()), 400);
        assert_eq!(status_of(GuardError::InvalidTarget.into()), 400);
        assert_eq!(status_of(GuardError::UnsupportedScheme.into()), 400);
        assert_eq!(status_of(GuardError::ForbiddenAddress.into()), 403);
    }

    #[test]
    fn message_is_internal() {
        assert_eq!(status_of(Error::message("broken")), 500);
    }
}
