use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider refused the request itself, e.g. bad credentials or
    /// an unknown model.
    InvalidRequest,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if sending the same request again may succeed.
    ///
    /// Moderated content and invalid requests are rejected
    /// deterministically, everything else is assumed to be a transient
    /// condition of the backend.
    #[inline]
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Moderated | ErrorKind::InvalidRequest)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::InvalidRequest => write!(f, "invalid request"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}
