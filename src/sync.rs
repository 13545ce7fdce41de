use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::client::Request;
use crate::scheduler::TaskOutcome;
use crate::session::{Session, SessionState};

pub const SYNC_PATH: &str = "/_matrix/client/r0/sync";
const CLIENT_PREFIX: &str = "/_matrix/client/r0";

#[derive(Debug, Default, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    next_batch: Option<String>,
    #[serde(default)]
    rooms: Option<Rooms>,
}

#[derive(Debug, Default, Deserialize)]
struct Rooms {
    #[serde(default)]
    join: Option<Map<String, Value>>,
}

/// Metrics label for a sync call. Cursor and filter values are templated out so the
/// label only varies with the timeout and which parameters are present.
pub fn sync_label(timeout_ms: u64, with_filter: bool, with_since: bool) -> String {
    let mut label = format!("{}?timeout={}", SYNC_PATH, timeout_ms);

    if with_filter {
        label.push_str("&filter=[filter]");
    }
    if with_since {
        label.push_str("&since=[token]");
    }

    label
}

/// The stored filter every session creates: short timelines, lazy-loaded members.
pub fn filter_definition() -> Value {
    json!({
        "room": {
            "timeline": { "limit": 20 },
            "state": { "lazy_load_members": true },
        }
    })
}

/// Folds a successful sync body into `state`.
///
/// A new `next_batch` always replaces the cursor. A non-empty `rooms.join` replaces the
/// known rooms; an absent or empty one leaves them alone.
pub fn apply_sync_response(state: &mut SessionState, body: &Value) {
    let response = match SyncResponse::deserialize(body) {
        Ok(response) => response,
        Err(e) => {
            warn!("Unexpected sync body shape: {}", e);
            return;
        }
    };

    if let Some(cursor) = response.next_batch {
        state.sync_cursor = Some(cursor);
    }

    if let Some(join) = response.rooms.and_then(|r| r.join) {
        if !join.is_empty() {
            state.known_room_ids = join.into_iter().map(|(room_id, _)| room_id).collect();
        }
    }
}

/// One sync exchange. Returns whether the server answered 200; on any other answer the
/// session state is left exactly as it was.
pub async fn sync(session: &mut Session, timeout_ms: u64) -> bool {
    let state = &session.state;
    let label = sync_label(
        timeout_ms,
        state.filter_id.is_some(),
        state.sync_cursor.is_some(),
    );

    let mut request = Request::get(SYNC_PATH).label(label).param("timeout", timeout_ms);
    if let Some(ref filter_id) = state.filter_id {
        request = request.param("filter", filter_id);
    }
    if let Some(ref cursor) = state.sync_cursor {
        request = request.param("since", cursor);
    }

    let response = match session.exchange(request).await {
        Ok(response) if response.status == 200 => response,
        Ok(response) => {
            debug!("Session {}: sync returned {}", session.index, response.status);
            return false;
        }
        Err(_) => return false,
    };

    match response.body {
        Some(ref body) => apply_sync_response(&mut session.state, body),
        None => warn!("Session {}: sync returned 200 without a JSON body", session.index),
    }

    true
}

/// Creates the session's filter if it has none yet, otherwise re-reads it by id.
///
/// Sessions are strictly sequential, so a create is never in flight twice. A failed
/// create leaves `filter_id` unset and the next page load tries again.
pub async fn bootstrap_filter(session: &mut Session) -> bool {
    let user_id = session.state.user_id.clone();

    if let Some(ref filter_id) = session.state.filter_id {
        let path = format!("{}/user/{}/filter/{}", CLIENT_PREFIX, user_id, filter_id);
        let request = Request::get(path)
            .label(format!("{}/user/[user-id]/filter/[filter]", CLIENT_PREFIX));

        return matches!(session.exchange(request).await, Ok(r) if r.status == 200);
    }

    let request = Request::post(format!("{}/user/{}/filter", CLIENT_PREFIX, user_id))
        .label(format!("{}/user/[user-id]/filter", CLIENT_PREFIX))
        .json(filter_definition());

    let response = match session.exchange(request).await {
        Ok(response) if response.status == 200 => response,
        _ => return false,
    };

    let filter_id = response.field("filter_id").and_then(|id| match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    match filter_id {
        Some(filter_id) => {
            debug!("Session {}: created filter {}", session.index, filter_id);
            session.state.filter_id = Some(filter_id);
            true
        }
        None => {
            warn!("Session {}: filter response carried no filter_id", session.index);
            false
        }
    }
}

/// What a client does once per page load: discovery, push rules, profile, presence,
/// filter bootstrap and a first sync.
pub async fn page_load(session: &mut Session) -> TaskOutcome {
    let user_id = session.state.user_id.clone();

    let cold_calls = [
        Request::get("/_matrix/client/versions"),
        Request::get(format!("{}/voip/turnServer", CLIENT_PREFIX)),
        Request::get(format!("{}/pushrules/", CLIENT_PREFIX)),
        Request::get(format!("{}/joined_groups", CLIENT_PREFIX)),
        Request::get(format!("{}/profile/{}", CLIENT_PREFIX, user_id))
            .label(format!("{}/profile/[user-id]", CLIENT_PREFIX)),
        Request::get(format!("{}/capabilities", CLIENT_PREFIX)),
        Request::put(format!("{}/presence/{}/status", CLIENT_PREFIX, user_id))
            .label(format!("{}/presence/[user-id]/status", CLIENT_PREFIX))
            .json(json!({ "presence": "online" })),
    ];

    let mut all_ok = true;
    for request in cold_calls {
        all_ok &= matches!(session.exchange(request).await, Ok(r) if r.status == 200);
    }

    all_ok &= bootstrap_filter(session).await;
    all_ok &= sync(session, 0).await;

    if all_ok {
        TaskOutcome::Ran
    } else {
        TaskOutcome::Failed
    }
}

/// The recurring poll: an immediate sync, optionally followed by a long-poll one.
pub async fn background_sync(
    session: &mut Session,
    long_poll_timeout_ms: Option<u64>,
) -> TaskOutcome {
    let mut ok = sync(session, 0).await;

    if let Some(timeout_ms) = long_poll_timeout_ms {
        ok &= sync(session, timeout_ms).await;
    }

    if ok {
        TaskOutcome::Ran
    } else {
        TaskOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_templates_parameters() {
        assert_eq!(sync_label(0, false, false), "/_matrix/client/r0/sync?timeout=0");
        assert_eq!(
            sync_label(30000, true, true),
            "/_matrix/client/r0/sync?timeout=30000&filter=[filter]&since=[token]"
        );
    }

    #[test]
    fn cursor_is_overwritten() {
        let mut state = SessionState::new("@a:x");
        state.sync_cursor = Some("old".into());

        apply_sync_response(&mut state, &json!({ "next_batch": "new" }));

        assert_eq!(state.sync_cursor.as_deref(), Some("new"));
    }

    #[test]
    fn empty_join_keeps_known_rooms() {
        let mut state = SessionState::new("@a:x");
        state.known_room_ids = vec!["!keep:x".into()];

        apply_sync_response(&mut state, &json!({ "next_batch": "c", "rooms": { "join": {} } }));
        apply_sync_response(&mut state, &json!({ "next_batch": "d", "rooms": {} }));
        apply_sync_response(&mut state, &json!({ "next_batch": "e" }));

        assert_eq!(state.known_room_ids, vec!["!keep:x".to_string()]);
        assert_eq!(state.sync_cursor.as_deref(), Some("e"));
    }

    #[test]
    fn joined_rooms_replace_previous() {
        let mut state = SessionState::new("@a:x");
        state.known_room_ids = vec!["!old:x".into()];

        let body = json!({ "rooms": { "join": { "!r1:x": {}, "!r2:x": {} } } });
        apply_sync_response(&mut state, &body);

        assert_eq!(state.known_room_ids, vec!["!r1:x".to_string(), "!r2:x".to_string()]);
    }

    #[test]
    fn joined_rooms_keep_server_order() {
        let mut state = SessionState::new("@a:x");

        let body = json!({ "rooms": { "join": { "!z:x": {}, "!m:x": {}, "!a:x": {} } } });
        apply_sync_response(&mut state, &body);

        assert_eq!(state.known_room_ids, vec!["!z:x", "!m:x", "!a:x"]);
    }

    #[test]
    fn malformed_body_changes_nothing() {
        let mut state = SessionState::new("@a:x");
        state.sync_cursor = Some("c".into());

        apply_sync_response(&mut state, &json!({ "next_batch": 42 }));

        assert_eq!(state.sync_cursor.as_deref(), Some("c"));
    }
}
