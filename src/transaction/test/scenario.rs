use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::body::{Allocator, RequestBody, RequestPart};
use crate::executor::{ExecutorHandle, RequestExecutor};
use crate::queue::{QueueHandle, QueueToken};
use crate::request::PreparedRequest;
use crate::response::ResponseHead;
use crate::transaction::state::*;
use crate::transaction::{ResponseFuture, Transaction};
use crate::Error;

#[derive(Default)]
pub struct MockExecutor {
    parts: Mutex<Vec<RequestPart>>,
    cancels: AtomicUsize,
    demands: AtomicUsize,
    chunk_size: Option<usize>,
    pub body_end: Notify,
}

impl MockExecutor {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        MockExecutor {
            chunk_size: Some(chunk_size),
            ..Default::default()
        }
    }

    pub fn parts(&self) -> Vec<RequestPart> {
        self.parts.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn demands(&self) -> usize {
        self.demands.load(Ordering::SeqCst)
    }
}

impl RequestExecutor for MockExecutor {
    fn write_request_body_part(&self, part: RequestPart) {
        let end = part == RequestPart::End;
        self.parts.lock().unwrap().push(part);
        if end {
            self.body_end.notify_one();
        }
    }

    fn demand_response_body_stream(&self) {
        self.demands.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel_request(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn allocator(&self) -> Allocator {
        self.chunk_size.map(Allocator::new).unwrap_or_default()
    }
}

#[derive(Default)]
pub struct MockQueueToken {
    cancels: AtomicUsize,
}

impl MockQueueToken {
    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl QueueToken for MockQueueToken {
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Scenario {
    request: Request<()>,
    body: fn() -> RequestBody,
    chunk_size: Option<usize>,
}

pub struct ScenarioBuilder {
    request: http::request::Builder,
    body: fn() -> RequestBody,
    chunk_size: Option<usize>,
}

/// A state machine with the collaborators it was driven with.
pub struct Harness {
    pub machine: StateMachine,
    pub result: oneshot::Receiver<Result<Response<()>, Error>>,
    pub executor: Arc<MockExecutor>,
    pub token: Arc<MockQueueToken>,
}

impl Scenario {
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder {
            request: Request::builder(),
            body: || RequestBody::Empty,
            chunk_size: None,
        }
    }

    fn prepare(&self) -> PreparedRequest {
        self.prepare_with((self.body)())
    }

    fn prepare_with(&self, body: RequestBody) -> PreparedRequest {
        let mut req = Request::builder()
            .method(self.request.method().clone())
            .uri(self.request.uri().clone());

        for (k, v) in self.request.headers() {
            req = req.header(k, v);
        }

        PreparedRequest::new(req.body(body).unwrap()).unwrap()
    }

    fn executor(&self) -> Arc<MockExecutor> {
        match self.chunk_size {
            Some(n) => Arc::new(MockExecutor::with_chunk_size(n)),
            None => Arc::new(MockExecutor::default()),
        }
    }

    pub fn to_initialized(&self) -> Harness {
        let prepared = self.prepare();
        let (tx, rx) = oneshot::channel();

        Harness {
            machine: StateMachine::new(tx, prepared.body_mode()),
            result: rx,
            executor: self.executor(),
            token: Arc::new(MockQueueToken::default()),
        }
    }

    pub fn to_queued(&self) -> Harness {
        let mut h = self.to_initialized();
        let token = h.token_handle();
        let action = h.machine.request_was_queued(token);
        assert!(matches!(action, QueuedAction::None));
        h
    }

    pub fn to_executing(&self) -> Harness {
        let mut h = self.to_queued();
        let executor = h.executor_handle();
        let action = h.machine.will_execute_request(executor);
        assert!(matches!(action, StartExecutionAction::None));
        h
    }

    /// Executing with body production started and demand present.
    pub fn to_body_ready(&self) -> Harness {
        let mut h = self.to_executing();
        let action = h.machine.resume_request_body_stream();
        assert!(matches!(action, ResumeProducingAction::StartStream(_)));
        h
    }

    /// Executing with the response head received, no consumer waiting.
    pub fn to_streaming(&self) -> Harness {
        let mut h = self.to_executing();
        let action = h.machine.receive_response_head(ResponseHead::new(StatusCode::OK));
        assert!(matches!(action, ReceiveHeadAction::None));
        h
    }

    pub fn to_transaction(&self) -> (Arc<Transaction>, ResponseFuture, Arc<MockExecutor>) {
        let (transaction, response) = Transaction::new(self.prepare());
        (transaction, response, self.executor())
    }

    /// Like `to_transaction`, with a body source built by the test.
    pub fn to_transaction_with(
        &self,
        body: RequestBody,
    ) -> (Arc<Transaction>, ResponseFuture, Arc<MockExecutor>) {
        let (transaction, response) = Transaction::new(self.prepare_with(body));
        (transaction, response, self.executor())
    }
}

impl ScenarioBuilder {
    pub fn get(self, uri: &str) -> Self {
        ScenarioBuilder {
            request: self.request.method("GET").uri(uri),
            ..self
        }
    }

    pub fn post(self, uri: &str) -> Self {
        ScenarioBuilder {
            request: self.request.method("POST").uri(uri),
            ..self
        }
    }

    pub fn header(self, key: &'static str, value: &'static str) -> Self {
        ScenarioBuilder {
            request: self.request.header(key, value),
            ..self
        }
    }

    pub fn body(self, body: fn() -> RequestBody) -> Self {
        ScenarioBuilder { body, ..self }
    }

    pub fn chunk_size(self, chunk_size: usize) -> Self {
        ScenarioBuilder {
            chunk_size: Some(chunk_size),
            ..self
        }
    }

    pub fn build(self) -> Scenario {
        Scenario {
            request: self.request.body(()).unwrap(),
            body: self.body,
            chunk_size: self.chunk_size,
        }
    }
}

impl Harness {
    pub fn executor_handle(&self) -> ExecutorHandle {
        self.executor.clone().into()
    }

    pub fn token_handle(&self) -> QueueHandle {
        self.token.clone().into()
    }

    /// Take the terminal result, if it has been resolved and not taken before.
    pub fn take_result(&mut self) -> Option<Result<Response<()>, Error>> {
        self.result.try_recv().ok()
    }

    pub fn write(&mut self, data: &'static [u8]) -> NextWriteAction {
        self.machine.write_next_request_part(Bytes::from_static(data))
    }

    pub fn receive(&mut self, data: &'static [u8]) -> ReceiveBodyAction {
        self.machine
            .receive_response_body_part(Bytes::from_static(data))
    }
}

/// Unwind like the driver does, counting on the mocks.
pub fn unwind(action: FailAction) {
    let FailAction::FailResponseHead {
        head_waiter,
        error,
        queue_token,
        executor,
        request_body_waiter,
        response_part_waiter,
        deadline,
        producer,
    } = action
    else {
        return;
    };

    if let Some(task) = deadline {
        task.abort();
    }
    if let Some(task) = producer {
        task.abort();
    }
    if let Some(token) = queue_token {
        token.cancel();
    }
    if let Some(executor) = executor {
        executor.cancel();
    }
    if let Some(w) = head_waiter {
        let _ = w.send(Err(error.clone()));
    }
    if let Some(w) = request_body_waiter {
        let _ = w.send(Err(error.clone()));
    }
    if let Some(w) = response_part_waiter {
        let _ = w.send(Err(error));
    }
}

pub fn in_memory_hello() -> RequestBody {
    RequestBody::from_bytes("hello")
}

pub fn unknown_length_empty() -> RequestBody {
    RequestBody::stream(None, futures::stream::empty())
}

/// A body of unknown length fed chunk by chunk through the returned sender.
/// Dropping the sender ends the body.
pub fn channel_body() -> (mpsc::UnboundedSender<Bytes>, RequestBody) {
    let (tx, rx) = mpsc::unbounded_channel();
    let source = futures::stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await;
        chunk.map(|chunk| (Ok::<_, Error>(chunk), rx))
    });
    (tx, RequestBody::stream(None, source))
}

/// Yield to other tasks until the executor received `n` parts.
pub async fn parts_written(executor: &MockExecutor, n: usize) {
    while executor.parts().len() < n {
        tokio::task::yield_now().await;
    }
}
