use std::{sync::Arc, time::Duration};

use log::debug;
use rand::rngs::StdRng;

use crate::client::{Client, Request, Response};
use crate::error::ClientError;
use crate::metrics::{Outcome, Reporter};
use crate::users::{Identity, UserPool};

/// Immutable snapshot built once at startup and shared by every session.
pub struct RunContext {
    pub client: Arc<dyn Client>,
    pub users: UserPool,
    pub shared_secret: Option<String>,
    pub reporter: Arc<dyn Reporter>,
}

/// Per-session protocol state. Only the owning session ever touches it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: String,
    pub bearer_token: Option<String>,
    /// Latest `next_batch` seen; `None` means the next sync is a full one.
    pub sync_cursor: Option<String>,
    pub filter_id: Option<String>,
    /// Joined rooms from the most recent sync that reported any.
    pub known_room_ids: Vec<String>,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// One simulated client: its identity, its state and its private randomness.
pub struct Session {
    pub index: usize,
    pub identity: Identity,
    pub state: SessionState,
    pub rng: StdRng,
    ctx: Arc<RunContext>,
}

impl Session {
    pub fn new(index: usize, identity: Identity, ctx: Arc<RunContext>, rng: StdRng) -> Self {
        let state = SessionState::new(identity.user_id.clone());

        Self {
            index,
            identity,
            state,
            rng,
            ctx,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.bearer_token.is_some()
    }

    /// Installs the bearer credential used by every later exchange of this session.
    pub fn set_bearer(&mut self, token: impl Into<String>) {
        self.state.bearer_token = Some(token.into());
    }

    /// Sends `request` with the session's default headers and reports the outcome,
    /// counting only a 200 as success.
    pub async fn exchange(&self, request: Request) -> Result<Response, ClientError> {
        self.exchange_with(request, |status| status == 200).await
    }

    /// Like [`Session::exchange`] with a caller-supplied success classification.
    pub async fn exchange_with<F>(
        &self,
        mut request: Request,
        is_success: F,
    ) -> Result<Response, ClientError>
    where
        F: Fn(u16) -> bool,
    {
        request
            .headers
            .push(("accept".to_owned(), "application/json".to_owned()));
        if let Some(ref token) = self.state.bearer_token {
            request
                .headers
                .push(("authorization".to_owned(), format!("Bearer {}", token)));
        }

        let label = request.label.clone();
        let result = self.ctx.client.request(request).await;

        let outcome = match result {
            Ok(ref response) => Outcome {
                success: is_success(response.status),
                ..Outcome::classify(label, response.status, response.elapsed)
            },
            Err(ref e) => {
                debug!("Session {}: {} failed: {}", self.index, label, e);
                Outcome::classify(label, 0, Duration::ZERO)
            }
        };

        self.ctx.reporter.report(&outcome);

        result
    }
}
