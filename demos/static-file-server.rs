use axum::body::Body;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::*;
use axum::Router;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use std::path::{Component, PathBuf};
use tokio::net::TcpListener;

use axum_fail_soft::*;

// Serves files relative to the working directory:
//   curl -i http://127.0.0.1:8080/files/Cargo.toml
//   curl -i http://127.0.0.1:8080/files/nope.txt
async fn serve_file(request: RequestContext, Path(path): Path<String>) -> Response {
    let root = std::env::current_dir().unwrap_or_default();
    match resolve_within(&root, &path) {
        Some(file) => FailSoftResponse::respond(request, UpstreamSource::file(file)).await,
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

// Only plain path segments are accepted, `..` can't climb out of `root`.
fn resolve_within(root: &std::path::Path, path: &str) -> Option<PathBuf> {
    let relative = std::path::Path::new(path.trim_start_matches('/'));
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        .then(|| root.join(relative))
}

// Echoes the request body, then flips a coin at its end: either a greeting is
// appended or the stream fails after the headers are already out.
//   curl -i -d 'Flipping a coin... ' http://127.0.0.1:8080/lucky
async fn coin_flip(request: RequestContext, body: Body) -> Response {
    let echo = body.into_data_stream().map_err(SourceError::from);
    let flip = stream::once(async {
        if rand::random::<bool>() {
            Ok(Bytes::from("Good luck."))
        } else {
            Err(SourceError::new("bad luck."))
        }
    });

    FailSoftResponse::respond_with_options(
        request,
        UpstreamSource::new("CoinFlip", echo.chain(flip)),
        FailSoftOptions::new().truncation_trailer(true),
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();

    let app = Router::new()
        .route("/files/{*path}", get(serve_file))
        .route("/lucky", any(coin_flip));

    let listener = TcpListener::bind("127.0.0.1:8080").await?;

    axum::serve(listener, app).await?;

    Ok(())
}
