//! HTTP status interpretation for the downloads and gethash endpoints.

use thiserror::Error;

/// A status code the server uses to refuse a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatusError {
    /// 400: the request body was not understood.
    #[error("invalid request format (400)")]
    InvalidRequest,

    /// 403: the API key was refused.
    #[error("API key rejected (403)")]
    Forbidden,

    /// 503: the server wants clients to back off.
    #[error("service unavailable (503)")]
    Backoff,

    /// 505: the protocol version is not supported.
    #[error("protocol version not supported (505)")]
    BadProtocol,

    /// Anything else outside 200 and 204.
    #[error("unexpected HTTP status {0}")]
    UnknownStatus(u16),
}

/// Accept 200 and 204, map everything else to a [`StatusError`].
pub fn check_status(status: u16) -> Result<(), StatusError> {
    match status {
        200 | 204 => Ok(()),
        400 => Err(StatusError::InvalidRequest),
        403 => Err(StatusError::Forbidden),
        503 => Err(StatusError::Backoff),
        505 => Err(StatusError::BadProtocol),
        other => Err(StatusError::UnknownStatus(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_pass() {
        assert_eq!(check_status(200), Ok(()));
        assert_eq!(check_status(204), Ok(()));
    }

    #[test]
    fn known_refusals_map_to_variants() {
        assert_eq!(check_status(400), Err(StatusError::InvalidRequest));
        assert_eq!(check_status(403), Err(StatusError::Forbidden));
        assert_eq!(check_status(503), Err(StatusError::Backoff));
        assert_eq!(check_status(505), Err(StatusError::BadProtocol));
    }

    #[test]
    fn other_codes_are_unexpected() {
        assert_eq!(check_status(302), Err(StatusError::UnknownStatus(302)));
        assert_eq!(check_status(500), Err(StatusError::UnknownStatus(500)));
    }
}
