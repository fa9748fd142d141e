use crate::diagnostics::{DiagnosticContextProvider, ProcessDiagnostics, RequestContext};
use crate::envelope::ErrorEnvelope;
use crate::source::UpstreamSource;
use crate::source_error::SourceError;
use crate::transport::{ChannelTransport, ResponseTransport};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::fmt::Formatter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Trailer announcing that the body was cut short by an upstream failure.
pub const TRUNCATION_TRAILER: &str = "x-fail-soft-truncated";

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

pub struct FailSoftOptions {
    pub channel_capacity: usize,
    pub diagnostics: Arc<dyn DiagnosticContextProvider>,
    pub truncation_trailer: bool,
}

impl FailSoftOptions {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            diagnostics: Arc::new(ProcessDiagnostics::new()),
            truncation_trailer: false,
        }
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn diagnostics<P>(mut self, provider: P) -> Self
    where
        P: DiagnosticContextProvider + 'static,
    {
        self.diagnostics = Arc::new(provider);
        self
    }

    /// Send a [`TRUNCATION_TRAILER`] when an error is appended to a partially sent body.
    pub fn truncation_trailer(mut self, enabled: bool) -> Self {
        self.truncation_trailer = enabled;
        self
    }
}

impl std::fmt::Debug for FailSoftOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailSoftOptions")
            .field("channel_capacity", &self.channel_capacity)
            .field("truncation_trailer", &self.truncation_trailer)
            .finish()
    }
}

/// A response that streams an upstream source and fails soft.
///
/// The head is flushed with the source's status and headers on its first chunk, or
/// at its end when it produced nothing. When the source fails before that, the
/// client receives the mapped status and a JSON [`ErrorEnvelope`] instead. When it
/// fails after bytes went out, the envelope is appended to the partial body and the
/// original status stands.
pub struct FailSoftResponse<T> {
    transport: T,
    request: RequestContext,
    options: FailSoftOptions,
}

impl<T> std::fmt::Debug for FailSoftResponse<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FailSoftResponse({:?})", self.request)
    }
}

impl<T> FailSoftResponse<T>
where
    T: ResponseTransport + 'static,
{
    pub fn new(transport: T, request: RequestContext) -> Self {
        Self::with_options(transport, request, FailSoftOptions::new())
    }

    pub fn with_options(transport: T, request: RequestContext, options: FailSoftOptions) -> Self {
        Self {
            transport,
            request,
            options,
        }
    }

    pub fn headers_sent(&self) -> bool {
        self.transport.headers_sent()
    }

    /// Starts streaming `source` on the current tokio runtime and returns immediately.
    pub fn attach(self, source: UpstreamSource) -> JoinHandle<()> {
        tokio::spawn(self.pipe(source))
    }

    async fn pipe(mut self, source: UpstreamSource) {
        let UpstreamSource {
            kind,
            status,
            headers,
            mut stream,
        } = source;
        let status = status.unwrap_or(StatusCode::OK);
        let mut headers = headers.unwrap_or_default();
        if self.options.truncation_trailer {
            headers.insert(
                http::header::TRAILER,
                HeaderValue::from_static(TRUNCATION_TRAILER),
            );
        }

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    self.flush_head(status, &headers);
                    if self.transport.write(chunk).await.is_err() {
                        debug!(
                            source = %kind,
                            url = ?self.request.url,
                            "Client went away, dropping upstream source"
                        );
                        return;
                    }
                }
                Err(err) => {
                    self.fail(&kind, err).await;
                    return;
                }
            }
        }

        self.flush_head(status, &headers);
        let _ = self.transport.close(None).await;
    }

    /// Writes the head unless it's already out. Returns whether this call sent it.
    fn flush_head(&mut self, status: StatusCode, headers: &HeaderMap) -> bool {
        if self.transport.headers_sent() {
            return false;
        }
        match self.transport.write_head(status, headers.clone()) {
            Ok(()) => {
                debug!(status = %status, url = ?self.request.url, "Response headers sent");
                true
            }
            Err(err) => {
                debug!(status = %status, "Response headers were not sent: {}", err);
                false
            }
        }
    }

    async fn fail(&mut self, kind: &str, err: SourceError) {
        let envelope = ErrorEnvelope::new(
            kind,
            &err,
            &self.request,
            self.options.diagnostics.process_context(),
        );
        let status = envelope.status_code();
        warn!(
            source = %kind,
            status = %status,
            method = ?self.request.method,
            url = ?self.request.url,
            "Upstream source failed: {}",
            err
        );

        if !self.transport.is_writable() {
            debug!(source = %kind, "Response transport is closed, error envelope dropped");
            return;
        }

        let (body, content_type) = error_body(envelope.to_json_bytes(), &err);

        if self.transport.headers_sent() {
            debug!(
                source = %kind,
                "Headers already sent, appending error envelope to the partial body"
            );
            let _ = self.transport.write(body).await;
            let trailers = self.options.truncation_trailer.then(|| {
                let mut trailers = HeaderMap::new();
                trailers.insert(TRUNCATION_TRAILER, HeaderValue::from(status.as_u16()));
                trailers
            });
            let _ = self.transport.close(trailers).await;
        } else {
            let mut headers = HeaderMap::new();
            headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));
            headers.insert(http::header::CONTENT_TYPE, content_type);
            self.flush_head(status, &headers);
            let _ = self.transport.write(body).await;
            let _ = self.transport.close(None).await;
        }
    }
}

/// Body and content type for a failure, falling back to the plain error text.
fn error_body(
    serialized: Result<Bytes, serde_json::Error>,
    err: &SourceError,
) -> (Bytes, HeaderValue) {
    match serialized {
        Ok(body) => (body, HeaderValue::from_static("application/json")),
        Err(serialize_err) => {
            warn!("Unable to serialize error envelope: {}", serialize_err);
            (
                Bytes::from(err.to_string()),
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
        }
    }
}

impl FailSoftResponse<ChannelTransport> {
    /// Streams `source` as an axum response, waiting only until the head is decided.
    pub async fn respond(request: RequestContext, source: UpstreamSource) -> Response {
        Self::respond_with_options(request, source, FailSoftOptions::new()).await
    }

    pub async fn respond_with_options(
        request: RequestContext,
        source: UpstreamSource,
        options: FailSoftOptions,
    ) -> Response {
        let (transport, channel_response) = ChannelTransport::new(options.channel_capacity);
        FailSoftResponse::with_options(transport, request, options).attach(source);
        channel_response.response().await
    }
}
