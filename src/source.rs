use crate::source_error::SourceError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::fmt::Formatter;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;

/// The producer attached to a fail-soft response.
///
/// Besides the byte stream, a source may declare the status and headers the
/// response should carry once its first chunk arrives.
pub struct UpstreamSource {
    pub(crate) kind: String,
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) stream: BoxStream<'static, Result<Bytes, SourceError>>,
}

impl std::fmt::Debug for UpstreamSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UpstreamSource({})", self.kind)
    }
}

impl UpstreamSource {
    /// Create a source from a stream of chunks. `kind` names the producer in error envelopes.
    pub fn new<K, S, E>(kind: K, stream: S) -> Self
    where
        K: Into<String>,
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<SourceError> + 'static,
    {
        Self {
            kind: kind.into(),
            status: None,
            headers: None,
            stream: stream.map_err(Into::into).boxed(),
        }
    }

    /// Streams a file from disk.
    ///
    /// The file is opened on first poll, so a missing path or a denied permission
    /// is reported before any byte and the client gets a proper status.
    pub fn file<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        let display_path = path.display().to_string();
        let open_path = display_path.clone();
        let stream = futures::stream::once(tokio::fs::File::open(path))
            .map_err(move |err| file_error(err, "open", &open_path))
            .map_ok(move |file| {
                let read_path = display_path.clone();
                ReaderStream::new(file).map_err(move |err| file_error(err, "read", &read_path))
            })
            .try_flatten();
        Self::new("File", stream)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: http::header::IntoHeaderName,
        V: Into<HeaderValue>,
    {
        let current_headers = self.headers.get_or_insert(HeaderMap::new());
        current_headers.append(key, value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

fn file_error(err: std::io::Error, syscall: &str, path: &str) -> SourceError {
    SourceError::from(err)
        .with_detail("syscall", syscall)
        .with_detail("path", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_map::ErrorCode;

    #[test]
    fn test_source_hints() {
        let source = UpstreamSource::new(
            "Slice",
            futures::stream::iter(vec![Ok::<_, SourceError>(Bytes::from("0123456789"))]),
        )
        .status(StatusCode::PARTIAL_CONTENT)
        .header(
            http::header::CONTENT_RANGE,
            HeaderValue::from_static("bytes 0-9/100"),
        );

        assert_eq!(source.kind(), "Slice");
        assert_eq!(source.status, Some(StatusCode::PARTIAL_CONTENT));
        assert_eq!(
            source
                .headers
                .as_ref()
                .and_then(|headers| headers.get(http::header::CONTENT_RANGE))
                .unwrap(),
            "bytes 0-9/100"
        );
    }

    #[tokio::test]
    async fn test_file_source_streams_content() {
        let path = std::env::temp_dir().join(format!(
            "axum-fail-soft-source-{}.txt",
            std::process::id()
        ));
        tokio::fs::write(&path, "Good luck.").await.unwrap();

        let chunks: Vec<Bytes> = UpstreamSource::file(&path)
            .stream
            .try_collect()
            .await
            .unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(chunks.concat(), b"Good luck.".to_vec());
    }

    #[tokio::test]
    async fn test_missing_file_fails_first() {
        let mut stream = UpstreamSource::file("/definitely/not/here.txt").stream;
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::NotFound));
        assert_eq!(err.detail()["syscall"], "open");
        assert_eq!(err.detail()["path"], "/definitely/not/here.txt");
        assert!(stream.next().await.is_none());
    }
}
