//! Test doubles for running the form without a browser or a service.
//!
//! `RecordingTransport` records every request and replays scripted replies,
//! optionally holding a reply until the test releases it so races between
//! triggers can be staged. `QueueSpawner` collects spawned recomputes so a
//! test decides when (and in which order) they run.

use std::cell::RefCell;
use std::collections::VecDeque;

use futures_channel::oneshot;

use crate::credential::Credential;
use crate::orchestrator::{LocalTask, Navigator, Spawner};
use crate::recompute::RecomputeError;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub header: Option<(String, String)>,
    /// Form fields for POST, query pairs for GET.
    pub fields: Vec<(String, String)>,
}

enum Scripted {
    Reply(Result<String, RecomputeError>),
    Held,
}

type HeldReply = oneshot::Sender<Result<String, RecomputeError>>;

/// Replies are consumed in request order; with nothing scripted the
/// transport answers `{}`.
#[derive(Default)]
pub struct RecordingTransport {
    requests: RefCell<Vec<RecordedRequest>>,
    script: RefCell<VecDeque<Scripted>>,
    held: RefCell<Vec<Option<HeldReply>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, body: impl Into<String>) {
        self.push(Scripted::Reply(Ok(body.into())));
    }

    pub fn reply_with_status(&self, code: u16, body: impl Into<String>) {
        self.fail(RecomputeError::Status {
            code,
            body: body.into(),
        });
    }

    pub fn fail(&self, error: RecomputeError) {
        self.push(Scripted::Reply(Err(error)));
    }

    /// The next request waits until `release` is called for it.
    pub fn hold(&self) {
        self.push(Scripted::Held);
    }

    /// Answer the `nth` held request (counting in arrival order).
    /// Returns `false` if there is no such request or it was already answered.
    pub fn release(&self, nth: usize, body: impl Into<String>) -> bool {
        let sender = self
            .held
            .borrow_mut()
            .get_mut(nth)
            .and_then(Option::take);
        match sender {
            Some(sender) => sender.send(Ok(body.into())).is_ok(),
            None => false,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    fn push(&self, scripted: Scripted) {
        self.script.borrow_mut().push_back(scripted);
    }

    async fn answer(&self, request: RecordedRequest) -> Result<String, RecomputeError> {
        self.requests.borrow_mut().push(request);
        let next = self.script.borrow_mut().pop_front();
        match next {
            None => Ok("{}".to_string()),
            Some(Scripted::Reply(reply)) => reply,
            Some(Scripted::Held) => {
                let (sender, receiver) = oneshot::channel();
                self.held.borrow_mut().push(Some(sender));
                receiver
                    .await
                    .unwrap_or_else(|_| Err(RecomputeError::Network("held reply dropped".to_string())))
            }
        }
    }
}

impl Transport for RecordingTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        credential: &Credential,
        fields: &[(String, String)],
    ) -> Result<String, RecomputeError> {
        self.answer(RecordedRequest {
            method: "POST",
            path: endpoint.to_string(),
            header: Some((credential.header().to_string(), credential.token().to_string())),
            fields: fields.to_vec(),
        })
        .await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, RecomputeError> {
        self.answer(RecordedRequest {
            method: "GET",
            path: path.to_string(),
            header: None,
            fields: query.to_vec(),
        })
        .await
    }
}

/// Collects spawned tasks instead of running them.
#[derive(Default)]
pub struct QueueSpawner {
    tasks: RefCell<Vec<LocalTask>>,
}

impl QueueSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn take(&self) -> Vec<LocalTask> {
        std::mem::take(&mut *self.tasks.borrow_mut())
    }

    /// Run every queued task to completion, oldest first.
    pub async fn run_all(&self) {
        for task in self.take() {
            task.await;
        }
    }
}

impl Spawner for QueueSpawner {
    fn spawn(&self, task: LocalTask) {
        self.tasks.borrow_mut().push(task);
    }
}

/// Records navigations instead of leaving the page.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: RefCell<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.visited.borrow_mut().push(url.to_string());
    }
}
