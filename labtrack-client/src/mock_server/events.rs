//! GET /events: SSE stream of backend events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use labtrack_common::sse::create_event_sse_stream;
use std::convert::Infallible;

use super::MockState;

/// GET /events
pub async fn event_stream(
    State(state): State<MockState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_sse_stream("labtrack-mock", &state.event_bus)
}

/// Build event stream routes
pub fn event_routes() -> Router<MockState> {
    Router::new().route("/events", get(event_stream))
}
