use axum::body::{Body, Bytes, HttpBody};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use std::fmt::Formatter;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("response headers were already sent")]
    HeadersAlreadySent,
    #[error("response transport is closed")]
    Closed,
}

/// The outbound side of one HTTP response.
///
/// A transport accepts a single head (status and headers), then any number of body
/// chunks, then a close. Once the head is written `headers_sent` stays `true`.
pub trait ResponseTransport: Send {
    fn headers_sent(&self) -> bool;

    /// `false` once the peer went away or the transport was closed.
    fn is_writable(&self) -> bool;

    fn write_head(&mut self, status: StatusCode, headers: HeaderMap)
        -> Result<(), TransportError>;

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn close(
        &mut self,
        trailers: Option<HeaderMap>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

type ResponseHead = (StatusCode, HeaderMap);

/// Transport feeding an axum [`Response`] through channels.
///
/// The head travels over a oneshot so the handler can wait for it, body frames go
/// through a bounded channel which gives the producer backpressure.
pub struct ChannelTransport {
    head: Option<oneshot::Sender<ResponseHead>>,
    frames: Option<mpsc::Sender<Frame<Bytes>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, ChannelResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                head: Some(head_tx),
                frames: Some(frames_tx),
            },
            ChannelResponse {
                head: head_rx,
                body: ChannelBody {
                    frames: ReceiverStream::new(frames_rx),
                },
            },
        )
    }

    async fn send_frame(&mut self, frame: Frame<Bytes>) -> Result<(), TransportError> {
        match &self.frames {
            Some(frames) => frames
                .send(frame)
                .await
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelTransport")
    }
}

impl ResponseTransport for ChannelTransport {
    fn headers_sent(&self) -> bool {
        self.head.is_none()
    }

    fn is_writable(&self) -> bool {
        self.frames
            .as_ref()
            .is_some_and(|frames| !frames.is_closed())
    }

    fn write_head(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
    ) -> Result<(), TransportError> {
        let head = self.head.take().ok_or(TransportError::HeadersAlreadySent)?;
        head.send((status, headers))
            .map_err(|_| TransportError::Closed)
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        self.send_frame(Frame::data(chunk)).await
    }

    async fn close(&mut self, trailers: Option<HeaderMap>) -> Result<(), TransportError> {
        let result = match trailers {
            Some(trailers) => self.send_frame(Frame::trailers(trailers)).await,
            None => Ok(()),
        };
        self.frames = None;
        result
    }
}

/// Receiving half of a [`ChannelTransport`].
pub struct ChannelResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: ChannelBody,
}

impl ChannelResponse {
    /// Waits for the head and builds a response streaming the remaining frames.
    pub async fn response(self) -> Response {
        match self.head.await {
            Ok((status, headers)) => {
                let mut response: Response<Body> = Response::new(Body::new(self.body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(_) => {
                tracing::error!("Response transport dropped before sending headers");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl std::fmt::Debug for ChannelResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelResponse")
    }
}

pub struct ChannelBody {
    frames: ReceiverStream<Frame<Bytes>>,
}

impl std::fmt::Debug for ChannelBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelBody")
    }
}

impl HttpBody for ChannelBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}
