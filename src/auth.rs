use hmac::{Hmac, Mac};
use log::{debug, info};
use serde_json::json;
use sha2::Sha512;

use crate::client::Request;
use crate::error::AuthError;
use crate::session::Session;

type HmacSha512 = Hmac<Sha512>;

pub const LOGIN_PATH: &str = "/_matrix/client/r0/login";
pub const DEVICE_DISPLAY_NAME: &str = "Load Test Client";

const DEVICE_ID_LEN: usize = 16;

/// Password for `user_id` under `secret`: lowercase hex of HMAC-SHA512, always 128 chars.
///
/// Fixture provisioning relies on this being stable, so the same pair must always give
/// the same password.
pub fn derive_password(secret: &str, user_id: &str) -> String {
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        unreachable!("HMAC-SHA512 accepts any key size");
    };
    mac.update(user_id.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

/// Leading characters of the localpart, e.g. `@sso_0000d231816abba5:example.org` gives
/// `sso_0000d231816a`.
pub fn device_id(user_id: &str) -> String {
    let localpart = user_id.strip_prefix('@').unwrap_or(user_id);
    let localpart = localpart.split(':').next().unwrap_or(localpart);

    localpart.chars().take(DEVICE_ID_LEN).collect()
}

/// Gives the session a bearer credential.
///
/// A pre-issued token wins. Otherwise, with a shared secret configured, the derived
/// password is exchanged for a token through a login call. On error the session simply
/// stays unauthenticated.
pub async fn authenticate(session: &mut Session) -> Result<(), AuthError> {
    if session.is_authenticated() {
        return Ok(());
    }

    if let Some(token) = session.identity.token() {
        let token = token.to_owned();
        session.set_bearer(token);
        debug!("Session {}: adopted pre-issued token", session.index);
        return Ok(());
    }

    let secret = session
        .context()
        .shared_secret
        .clone()
        .ok_or(AuthError::NoCredentials)?;

    let user_id = &session.state.user_id;
    let body = json!({
        "type": "m.login.password",
        "user": user_id,
        "initial_device_display_name": DEVICE_DISPLAY_NAME,
        "device_id": device_id(user_id),
        "password": derive_password(&secret, user_id),
    });

    let response = session.exchange(Request::post(LOGIN_PATH).json(body)).await?;
    if response.status != 200 {
        return Err(AuthError::Rejected(response.status));
    }

    let token = response
        .field("access_token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?
        .to_owned();

    session.set_bearer(token);
    info!("Session {}: logged in as {}", session.index, session.state.user_id);

    Ok(())
}
