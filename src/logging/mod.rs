//! Per-request access lines, written through slog next to the tracing
//! output of the services.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use slog::{o, Drain, Logger};
use std::time::Instant;

const ACTOR_HEADER: &str = "x-actor-id";

/// Terminal access logger behind an async drain.
pub fn access_logger(color: bool) -> Logger {
    let mut decorator = slog_term::TermDecorator::new();
    if color {
        decorator = decorator.force_color();
    }
    let drain = slog_term::CompactFormat::new(decorator.build()).build().fuse();
    let drain = slog_async::Async::new(drain).chan_size(512).build().fuse();
    Logger::root(drain, o!("component" => "access"))
}

pub async fn access_log(State(logger): State<Logger>, req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let actor = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_owned();
    let request = logger.new(o!(
        "method" => req.method().to_string(),
        "path" => req.uri().path().to_owned(),
        "actor" => actor,
    ));

    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        slog::error!(request, "request failed"; "status" => status.as_u16(), "elapsed_ms" => elapsed_ms);
    } else {
        slog::info!(request, "request"; "status" => status.as_u16(), "elapsed_ms" => elapsed_ms);
    }
    response
}
