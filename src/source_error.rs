use crate::status_map::{status_for, ErrorCode};
use http::StatusCode;
use serde_json::{Map, Value};
use std::fmt::Formatter;

/// A failure reported by an upstream source.
///
/// Keeps what is needed to answer the client: the classification code used for the
/// status, a human-readable message, the raw error fields and the rendered cause chain.
#[derive(Debug, Clone)]
pub struct SourceError {
    code: Option<ErrorCode>,
    message: String,
    detail: Map<String, Value>,
    stack: Vec<String>,
}

impl SourceError {
    pub fn new<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        let message = message.into();
        Self {
            code: None,
            stack: vec![message.clone()],
            message,
            detail: Map::new(),
        }
    }

    /// Captures an arbitrary error together with its `source()` chain.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut stack = vec![err.to_string()];
        let mut cause = err.source();
        while let Some(current) = cause {
            stack.push(current.to_string());
            cause = current.source();
        }

        Self {
            code: None,
            message: err.to_string(),
            detail: Map::new(),
            stack,
        }
    }

    pub fn with_code<C>(mut self, code: C) -> Self
    where
        C: Into<ErrorCode>,
    {
        let code = code.into();
        self.detail
            .insert("code".to_string(), Value::String(code.as_str().to_string()));
        self.code = Some(code);
        self
    }

    pub fn with_detail<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.detail.insert(key.into(), value.into());
        self
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        self.code.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw error fields, possibly empty.
    pub fn detail(&self) -> &Map<String, Value> {
        &self.detail
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.code.as_ref())
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        let kind = format!("{:?}", err.kind());
        let errno = err.raw_os_error();
        let mut source_error = SourceError::from_error(&err)
            .with_code(ErrorCode::from_io_error(&err))
            .with_detail("kind", kind);
        if let Some(errno) = errno {
            source_error = source_error.with_detail("errno", errno);
        }
        source_error
    }
}

impl From<axum::Error> for SourceError {
    fn from(err: axum::Error) -> Self {
        match err.into_inner().downcast::<std::io::Error>() {
            Ok(io_err) => SourceError::from(*io_err),
            Err(other) => SourceError::from_error(&*other),
        }
    }
}

impl From<String> for SourceError {
    fn from(message: String) -> Self {
        SourceError::new(message)
    }
}

impl From<&str> for SourceError {
    fn from(message: &str) -> Self {
        SourceError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "reading upstream failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_plain_error_has_no_code() {
        let err = SourceError::new("bad luck.");
        assert_eq!(err.code(), None);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.detail().is_empty());
        assert_eq!(err.stack(), &["bad luck.".to_string()]);
        assert_eq!(err.to_string(), "bad luck.");
    }

    #[test]
    fn test_io_error_conversion() {
        let err = SourceError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file or directory",
        ));
        assert_eq!(err.code(), Some(&ErrorCode::NotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail()["code"], "ENOENT");
        assert_eq!(err.detail()["kind"], "NotFound");
        assert!(err.detail().get("errno").is_none());
        assert_eq!(err.to_string(), "ENOENT: no such file or directory");
    }

    #[test]
    fn test_axum_error_wrapping_io_error_is_classified() {
        let err = SourceError::from(axum::Error::new(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        )));
        assert_eq!(err.code(), Some(&ErrorCode::PermissionDenied));
        assert_eq!(err.status(), StatusCode::LOCKED);
    }

    #[test]
    fn test_axum_error_without_io_cause() {
        let err = SourceError::from(axum::Error::new("upstream hung up"));
        assert_eq!(err.code(), None);
        assert_eq!(err.message(), "upstream hung up");
    }

    #[test]
    fn test_cause_chain_is_rendered() {
        let err = SourceError::from_error(&Outer(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        )));
        assert_eq!(
            err.stack(),
            &[
                "reading upstream failed".to_string(),
                "disk on fire".to_string()
            ]
        );
    }

    #[test]
    fn test_custom_code_and_detail() {
        let err = SourceError::new("window closed")
            .with_code("ERANGE")
            .with_detail("requested", "bytes=100-200");
        assert_eq!(err.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(err.detail()["code"], "ERANGE");
        assert_eq!(err.detail()["requested"], "bytes=100-200");
    }
}
