use log::debug;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::client::Request;
use crate::scheduler::{SkipReason, TaskOutcome};
use crate::session::Session;

pub const MESSAGE_BODY: &str = "Load Test Message";
pub const TYPING_TIMEOUT_MS: u64 = 30000;

const ROOMS_PREFIX: &str = "/_matrix/client/r0/rooms";

/// A send is a success when it was accepted, or when the identity simply may not post
/// in that room. Only request handling is under test here.
pub fn send_succeeded(status: u16) -> bool {
    status == 200 || status == 403
}

/// Types into one known room, stops typing, then sends a message.
///
/// The caller gates on known rooms; with none this returns `Skipped` without touching
/// the network.
pub async fn simulate_activity(session: &mut Session) -> TaskOutcome {
    let Some(room_id) = session.state.known_room_ids.choose(&mut session.rng).cloned() else {
        return TaskOutcome::Skipped(SkipReason::NoKnownRooms);
    };
    let user_id = &session.state.user_id;

    let typing_path = format!("{}/{}/typing/{}", ROOMS_PREFIX, room_id, user_id);
    let typing_label = format!("{}/[room_id]/typing/[user-id]", ROOMS_PREFIX);

    let start_typing = Request::put(typing_path.clone())
        .label(typing_label.clone())
        .json(json!({ "typing": true, "timeout": TYPING_TIMEOUT_MS }));
    let stop_typing = Request::put(typing_path)
        .label(typing_label)
        .json(json!({ "typing": false }));
    let send = Request::post(format!("{}/{}/send/m.room.message", ROOMS_PREFIX, room_id))
        .label(format!("{}/[room_id]/send/m.room.message", ROOMS_PREFIX))
        .json(json!({ "msgtype": "m.text", "body": MESSAGE_BODY }));

    let mut ok = matches!(session.exchange(start_typing).await, Ok(r) if r.status == 200);
    ok &= matches!(session.exchange(stop_typing).await, Ok(r) if r.status == 200);

    match session.exchange_with(send, send_succeeded).await {
        Ok(r) if send_succeeded(r.status) => {}
        Ok(r) => {
            debug!("Session {}: send returned {}", session.index, r.status);
            ok = false;
        }
        Err(_) => ok = false,
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
    fn send_classification() {
        assert!(send_succeeded(200));
        assert!(send_succeeded(403));
        assert!(!send_succeeded(500));
        assert!(!send_succeeded(401));
        assert!(!send_succeeded(0));
    }
}
