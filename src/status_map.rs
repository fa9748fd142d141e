use http::StatusCode;
use std::fmt::Formatter;
use std::str::FromStr;

/// Classification code of an upstream failure.
///
/// The well-known codes follow the POSIX errno names so that errors coming from
/// files and pipes keep the names operators already grep for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `ENOENT`
    NotFound,
    /// `ENOTDIR`
    NotADirectory,
    /// `ERANGE`
    RangeNotSatisfiable,
    /// `EACCES`
    PermissionDenied,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NotFound => "ENOENT",
            ErrorCode::NotADirectory => "ENOTDIR",
            ErrorCode::RangeNotSatisfiable => "ERANGE",
            ErrorCode::PermissionDenied => "EACCES",
            ErrorCode::Other(code) => code.as_str(),
        }
    }

    /// HTTP status a failure with this code is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound | ErrorCode::NotADirectory => StatusCode::NOT_FOUND,
            ErrorCode::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorCode::PermissionDenied => StatusCode::LOCKED,
            ErrorCode::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn from_io_error(err: &std::io::Error) -> Self {
        #[cfg(unix)]
        let out_of_range = err.raw_os_error() == Some(libc::ERANGE);
        #[cfg(not(unix))]
        let out_of_range = false;

        if out_of_range {
            return ErrorCode::RangeNotSatisfiable;
        }

        match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::NotFound,
            std::io::ErrorKind::NotADirectory => ErrorCode::NotADirectory,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            kind => ErrorCode::Other(format!("{:?}", kind)),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        match value {
            "ENOENT" => ErrorCode::NotFound,
            "ENOTDIR" => ErrorCode::NotADirectory,
            "ERANGE" => ErrorCode::RangeNotSatisfiable,
            "EACCES" => ErrorCode::PermissionDenied,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

/// Status for an optional classification code; unclassified failures are `500`.
pub fn status_for(code: Option<&ErrorCode>) -> StatusCode {
    code.map(ErrorCode::status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_to_statuses() {
        assert_eq!(status_for(Some(&"ENOENT".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(Some(&"ENOTDIR".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(Some(&"ERANGE".into())),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(status_for(Some(&"EACCES".into())), StatusCode::LOCKED);
    }

    #[test]
    fn test_unknown_or_missing_code_is_internal_error() {
        assert_eq!(
            status_for(Some(&"EPIPE".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(None), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_io_error_classification() {
        let not_found = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(ErrorCode::from_io_error(&not_found), ErrorCode::NotFound);

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            ErrorCode::from_io_error(&denied),
            ErrorCode::PermissionDenied
        );

        let broken = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert_eq!(
            ErrorCode::from_io_error(&broken),
            ErrorCode::Other("BrokenPipe".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_os_errors_classification() {
        let range = std::io::Error::from_raw_os_error(libc::ERANGE);
        assert_eq!(
            ErrorCode::from_io_error(&range),
            ErrorCode::RangeNotSatisfiable
        );

        let not_dir = std::io::Error::from_raw_os_error(libc::ENOTDIR);
        assert_eq!(ErrorCode::from_io_error(&not_dir), ErrorCode::NotADirectory);
    }
}
