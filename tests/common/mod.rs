#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;

use synapse_load::client::{Client, Method, Request, Response};
use synapse_load::error::ClientError;
use synapse_load::metrics::{Outcome, Reporter};
use synapse_load::session::{RunContext, Session};
use synapse_load::users::{Identity, UserPool};

type Handler = Box<dyn Fn(&Request) -> Result<Response, ClientError> + Send + Sync>;

/// In-memory server: answers through `handler` and remembers every request as soon as
/// it arrives, before any simulated latency.
pub struct MockClient {
    handler: Handler,
    latency: Duration,
    requests: Mutex<Vec<Request>>,
}

impl MockClient {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Request) -> Result<Response, ClientError> + Send + Sync + 'static,
    {
        Self::with_latency(Duration::ZERO, handler)
    }

    /// Like [`MockClient::new`], but every answer takes `latency` to arrive.
    pub fn with_latency<F>(latency: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&Request) -> Result<Response, ClientError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            latency,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers 200 with an empty object to everything.
    pub fn always_ok() -> Arc<Self> {
        Self::new(|_| ok(serde_json::json!({})))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, label: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.label == label)
            .count()
    }
}

#[async_trait]
impl Client for MockClient {
    async fn request(&self, request: Request) -> Result<Response, ClientError> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        response
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingReporter {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn outcome_for(&self, label: &str) -> Option<Outcome> {
        self.outcomes().into_iter().rev().find(|o| o.label == label)
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, outcome: &Outcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

pub fn ok(body: Value) -> Result<Response, ClientError> {
    Ok(Response::new(200, Some(body)))
}

pub fn status(code: u16) -> Result<Response, ClientError> {
    Ok(Response::new(code, Some(serde_json::json!({ "errcode": "M_UNKNOWN" }))))
}

pub fn param<'a>(request: &'a Request, key: &str) -> Option<&'a str> {
    request
        .params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn context(
    client: Arc<MockClient>,
    users: Vec<Identity>,
    shared_secret: Option<&str>,
) -> (Arc<RunContext>, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());

    let ctx = Arc::new(RunContext {
        client,
        users: UserPool::new(users),
        shared_secret: shared_secret.map(str::to_owned),
        reporter: reporter.clone(),
    });

    (ctx, reporter)
}

pub fn session(ctx: Arc<RunContext>, identity: Identity) -> Session {
    Session::new(0, identity, ctx, StdRng::seed_from_u64(42))
}

/// A session that already holds a bearer token.
pub fn authenticated_session(client: Arc<MockClient>) -> (Session, Arc<RecordingReporter>) {
    let identity = Identity::new("@alice:example.org", "preissued");
    let (ctx, reporter) = context(client, vec![identity.clone()], None);

    let mut session = session(ctx, identity);
    session.set_bearer("preissued");

    (session, reporter)
}
