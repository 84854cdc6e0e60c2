//! SSE delivery of push-bus events.
//!
//! Each SSE connection registers one push-bus client and joins a single
//! room; the stream forwards events in publish order. Dropping the
//! connection disconnects the client and leaves its rooms.

use std::convert::Infallible;
use std::time::Duration;

use aeris_common::model::Coordinates;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tracing::{info, warn};

use crate::geo;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    lat: f64,
    lng: f64,
}

/// `GET /api/events?lat&lng` — realtime updates for a coarse location.
pub async fn location_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let room = geo::location_room(Coordinates::new(params.lat, params.lng));
    event_stream(state, room)
}

/// `GET /api/events/user/:id` — alert events for one subscriber.
pub async fn user_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(state, geo::user_room(&id))
}

fn event_stream(
    state: AppState,
    room: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.bus.connect();
    receiver.join(&room);
    info!(room, client_id = %receiver.client_id(), "sse client connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));
        loop {
            let event = receiver.recv().await;
            match Event::default().event(event.event_type()).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(err) => {
                    warn!(error = %err, "failed to serialize sse event");
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
