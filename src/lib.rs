#![allow(clippy::new_without_default)]
#![deny(unsafe_code)]

//! # Fail-soft streaming responses for axum
//!
//! Streaming a file, a pipe or a generated stream straight to the client means the
//! status line is committed before the source is known to be healthy. This crate
//! wraps such a source and keeps the response honest:
//!
//! - headers (the source's declared status and headers, `200` and none by default)
//!   are sent when the first chunk arrives, or at the end of an empty source;
//! - if the source fails before that, the client receives a mapped status
//!   (`ENOENT`/`ENOTDIR` → 404, `ERANGE` → 416, `EACCES` → 423, anything else 500)
//!   and a pretty-printed JSON error envelope with an exact `Content-Length`;
//! - if the source fails after bytes went out, the envelope is appended to the
//!   partial body. The status can't change anymore, but the client still learns why
//!   the response ended.
//!
//! # Example
//!
//! ```rust
//! use axum::{extract::Path, response::Response, routing::get, Router};
//! use axum_fail_soft::*;
//!
//! async fn serve_file(request: RequestContext, Path(path): Path<String>) -> Response {
//!     FailSoftResponse::respond(request, UpstreamSource::file(path)).await
//! }
//!
//! let app: Router = Router::new().route("/files/{*path}", get(serve_file));
//! ```
//!
//! Any `Stream<Item = Result<Bytes, E>>` can be attached with [`UpstreamSource::new`]
//! as long as `E` converts into a [`SourceError`]. Other HTTP stacks plug in by
//! implementing [`ResponseTransport`] and calling [`FailSoftResponse::attach`].

mod status_map;
pub use status_map::*;

mod source_error;
pub use source_error::SourceError;

mod source;
pub use source::UpstreamSource;

mod diagnostics;
pub use diagnostics::*;

mod envelope;
pub use envelope::ErrorEnvelope;

mod transport;
pub use transport::*;

mod fail_soft;
pub use fail_soft::*;

#[cfg(test)]
mod test_client;
