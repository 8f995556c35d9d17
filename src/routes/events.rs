use std::convert::Infallible;
use std::time::Duration;

use actix_web::{get, http::header, web, web::Bytes, HttpResponse};
use futures::{future::ready, stream, StreamExt};
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, IntervalStream};

use crate::{auth::AuthenticatedUser, db, events::Event, state::AppState};

/// One step of an event stream.
enum Frame {
    Data(Bytes),
    /// The credential behind the stream was revoked; the stream ends here.
    Revoked,
}

/// SSE bytes for one broadcast item, or `None` when it belongs to someone else.
fn sse_chunk(item: Result<Event, BroadcastStreamRecvError>, user_id: i32) -> Option<Bytes> {
    match item {
        Ok(event) if event.user_id == user_id => Some(Bytes::from(event.to_sse_frame())),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            log::warn!("Event stream for user {} lagged by {} events", user_id, missed);
            Some(Bytes::from(format!(": missed {} events\n\n", missed)))
        }
    }
}

/// Whether the session or API key that opened the stream can still be used.
/// Lookup errors count as revoked; the client reconnects and authenticates again.
async fn still_authorized(state: &AppState, user: AuthenticatedUser) -> bool {
    if let Some(session_id) = user.session_id {
        return matches!(state.sessions.get(session_id).await, Ok(Some(_)));
    }
    match user.api_key_id {
        Some(key_id) => db::api_keys::is_usable(&state.pool, key_id)
            .await
            .unwrap_or(false),
        None => false,
    }
}

/// Streams the caller's change events as Server-Sent Events.
///
/// Browsers' `EventSource` cannot set headers, so the access token may also be
/// passed as `?access_token=`. A comment line is sent every keepalive interval to
/// keep proxies from closing the connection; before each one the credential is
/// checked again and the stream closes once it has been revoked.
#[get("")]
pub async fn event_stream(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    let user_id = user.user_id;
    log::debug!("User {} subscribed to events", user_id);

    let events = BroadcastStream::new(state.events.subscribe())
        .filter_map(move |item| ready(sse_chunk(item, user_id).map(Frame::Data)));

    let period = Duration::from_secs(state.config.sse_keepalive_seconds.max(1));
    let keepalive = IntervalStream::new(interval_at(Instant::now() + period, period)).then(
        move |_| {
            let state = state.clone();
            async move {
                if still_authorized(&state, user).await {
                    Frame::Data(Bytes::from_static(b": keepalive\n\n"))
                } else {
                    log::info!("Closing event stream of user {}: credential revoked", user_id);
                    Frame::Revoked
                }
            }
        },
    );

    let frames = stream::select(events, keepalive)
        .take_while(|frame| ready(matches!(frame, Frame::Data(_))))
        .filter_map(|frame| {
            ready(match frame {
                Frame::Data(bytes) => Some(bytes),
                Frame::Revoked => None,
            })
        });
    let body = stream::once(ready(Bytes::from_static(b": connected\n\n")))
        .chain(frames)
        .map(Ok::<_, Infallible>);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::Utc;
    use serde_json::json;

    fn event_for(user_id: i32) -> Event {
        Event {
            kind: EventKind::TodoCreated,
            user_id,
            resource_id: None,
            payload: json!({ "title": "Write report" }),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_only_own_events_are_forwarded() {
        let own = sse_chunk(Ok(event_for(1)), 1).unwrap();
        let text = String::from_utf8(own.to_vec()).unwrap();
        assert!(text.starts_with("event: todo.created\n"));
        assert!(text.ends_with("\n\n"));

        assert!(sse_chunk(Ok(event_for(2)), 1).is_none());
    }

    #[test]
    fn test_lag_becomes_comment() {
        let chunk = sse_chunk(Err(BroadcastStreamRecvError::Lagged(3)), 1).unwrap();
        assert_eq!(&chunk[..], b": missed 3 events\n\n");
    }
}
