//! Driving a request through its lifecycle.
//!
//! [`Transaction`] owns a [`StateMachine`] behind a lock and performs the
//! actions the state machine returns: it talks to the executor and the queue
//! token, wakes suspended producers and consumers, and pumps the request body.
//! The lock is never held while calling out or across an `.await`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{ready, Stream, StreamExt};
use http::Response;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::body::{Allocator, BodyMode, BodyStream, RequestBody, RequestPart};
use crate::executor::ExecutorHandle;
use crate::queue::QueueHandle;
use crate::request::{PreparedRequest, RequestHead};
use crate::response::ResponseHead;
use crate::Error;

pub mod state;

#[cfg(test)]
mod test;

use self::state::*;

/// What the executor should do after handing over a response body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAction {
    /// Keep reading from the connection.
    Continue,
    /// Stop reading until [`RequestExecutor::demand_response_body_stream`] is called.
    ///
    /// [`RequestExecutor::demand_response_body_stream`]: crate::RequestExecutor::demand_response_body_stream
    Pause,
}

/// One in-flight request.
///
/// Shared between the pool, the executor it is bound to, the body producer and
/// the caller. Every method is one event for the state machine.
pub struct Transaction {
    head: RequestHead,
    body: Mutex<Option<RequestBody>>,
    state: Mutex<StateMachine>,
}

impl Transaction {
    /// Submit a request.
    ///
    /// Returns the transaction, to be handed to the pool, and the future
    /// resolving with the outcome exactly once.
    pub fn new(request: PreparedRequest) -> (Arc<Transaction>, ResponseFuture) {
        let (head, body, mode) = request.into_parts();
        let (tx, rx) = oneshot::channel();

        let transaction = Transaction {
            head,
            body: Mutex::new(Some(body)),
            state: Mutex::new(StateMachine::new(tx, mode)),
        };

        (Arc::new(transaction), ResponseFuture { rx })
    }

    /// The request head the executor writes.
    pub fn request_head(&self) -> &RequestHead {
        &self.head
    }

    /// How the request body is produced.
    pub fn body_mode(&self) -> BodyMode {
        self.lock().body_mode()
    }

    /// Tell if the transaction reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.lock().is_finished()
    }

    fn lock(&self) -> MutexGuard<'_, StateMachine> {
        // Actions are performed outside the lock, a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ////////////////////////////////////////////////////////////////////////////////////// POOL

    /// The pool put the transaction in its waiting list.
    pub fn request_was_queued(&self, token: QueueHandle) {
        let action = self.lock().request_was_queued(token);

        if let QueuedAction::Cancel(token) = action {
            token.cancel();
        }
    }

    /// The pool offers a connection.
    ///
    /// Returns `false` if the transaction is already over, in which case the
    /// executor has been told to cancel and must not be used.
    pub fn will_execute_request(&self, executor: ExecutorHandle) -> bool {
        let action = self.lock().will_execute_request(executor);

        match action {
            StartExecutionAction::None => true,
            StartExecutionAction::Cancel(executor) => {
                executor.cancel();
                false
            }
        }
    }

    // ////////////////////////////////////////////////////////////////////////////////////// EXECUTOR

    /// The executor can accept request body bytes.
    ///
    /// The first call starts the body producer, which needs a tokio runtime.
    pub fn resume_request_body_stream(self: &Arc<Self>) {
        let action = self.lock().resume_request_body_stream();

        match action {
            ResumeProducingAction::None => {}
            ResumeProducingAction::ResumeStream(waiter) => {
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Ok(()));
                }
            }
            ResumeProducingAction::StartStream(allocator) => self.start_stream(allocator),
        }
    }

    /// The executor cannot accept more request body bytes for now.
    pub fn withdraw_request_body_demand(&self) {
        self.lock().withdraw_request_body_demand();
    }

    /// The executor received the response head.
    pub fn receive_response_head(&self, head: ResponseHead) {
        let action = self.lock().receive_response_head(head);

        match action {
            ReceiveHeadAction::None => {}
            ReceiveHeadAction::SucceedHead(waiter, head) => {
                let _ = waiter.send(Ok(head));
            }
            ReceiveHeadAction::Fail(unwind) => self.unwind(unwind),
        }
    }

    /// The executor read a part of the response body.
    pub fn receive_response_body_part(&self, part: Bytes) -> ReadAction {
        trace!("Receive response body part: {} bytes", part.len());
        let action = self.lock().receive_response_body_part(part);

        match action {
            ReceiveBodyAction::None => ReadAction::Continue,
            ReceiveBodyAction::Deliver(waiter, part) => {
                if waiter.send(Ok(Some(part))).is_err() {
                    debug!("Response body consumer gone, part dropped");
                }
                ReadAction::Continue
            }
            ReceiveBodyAction::PauseReading => ReadAction::Pause,
            ReceiveBodyAction::Fail(unwind) => {
                self.unwind(unwind);
                ReadAction::Pause
            }
        }
    }

    /// The executor received the complete response.
    pub fn succeed_request(&self) {
        let action = self.lock().succeed();

        match action {
            SucceedAction::None => {}
            SucceedAction::Finish {
                part_waiter,
                demand_waiter,
                deadline,
                producer,
            } => {
                if let Some(task) = deadline {
                    task.abort();
                }
                if let Some(task) = producer {
                    task.abort();
                }
                if let Some(waiter) = part_waiter {
                    let _ = waiter.send(Ok(None));
                }
                if let Some(waiter) = demand_waiter {
                    let _ = waiter.send(Ok(()));
                }
            }
            SucceedAction::Fail(unwind) => self.unwind(unwind),
        }
    }

    /// Fail the transaction, for instance on a connection error.
    pub fn fail(&self, error: Error) {
        let unwind = self.lock().fail(error);
        self.unwind(unwind);
    }

    // ////////////////////////////////////////////////////////////////////////////////////// CALLER

    /// Cancel the request. Safe to call at any time, any number of times.
    pub fn cancel(&self) {
        let unwind = self.lock().cancel();
        self.unwind(unwind);
    }

    /// The deadline for the request passed.
    pub fn deadline_exceeded(&self) {
        let unwind = self.lock().deadline_exceeded();
        self.unwind(unwind);
    }

    /// Fail the request with [`Error::DeadlineExceeded`] unless it finishes
    /// before `deadline`.
    ///
    /// Setting a new deadline replaces the previous one. Needs a tokio runtime
    /// with the time driver enabled.
    pub fn set_deadline(self: &Arc<Self>, deadline: Instant) -> Result<(), Error> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Err(Error::ProtocolViolation(
                "no tokio runtime to run the deadline timer",
            ));
        };

        let transaction = Arc::downgrade(self);
        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(transaction) = transaction.upgrade() {
                debug!("Request deadline passed");
                transaction.deadline_exceeded();
            }
        });

        let abort = self.lock().schedule_deadline(task.abort_handle());

        if let Some(task) = abort {
            task.abort();
        }

        Ok(())
    }

    /// Wait for the response head.
    pub async fn response_head(&self) -> Result<ResponseHead, Error> {
        let (tx, rx) = oneshot::channel();
        let action = self.lock().wait_for_response_head(tx);

        match action {
            HeadAction::Wait => {}
            HeadAction::Succeed(waiter, head) => {
                let _ = waiter.send(Ok(head));
            }
            HeadAction::Fail(waiter, error, unwind) => {
                self.unwind(unwind);
                let _ = waiter.send(Err(error));
            }
        }

        rx.await.unwrap_or(Err(Error::Cancelled))
    }

    /// Stream of response body parts.
    ///
    /// At most one part is buffered ahead of the stream. The executor is paused
    /// until the stream is polled again.
    pub fn response_body(self: &Arc<Self>) -> ResponseBody {
        ResponseBody {
            transaction: self.clone(),
            pending: None,
            done: false,
        }
    }

    fn consume_next_response_part(&self, waiter: PartWaiter) {
        let action = self.lock().consume_next_response_part(waiter);

        match action {
            ConsumeAction::Wait => {}
            ConsumeAction::Deliver {
                waiter,
                part,
                demand,
            } => {
                let _ = waiter.send(Ok(Some(part)));
                if let Some(executor) = demand {
                    executor.demand_response_body();
                }
            }
            ConsumeAction::End(waiter) => {
                let _ = waiter.send(Ok(None));
            }
            ConsumeAction::Fail(waiter, error, unwind) => {
                self.unwind(unwind);
                let _ = waiter.send(Err(error));
            }
        }
    }

    // ////////////////////////////////////////////////////////////////////////////////////// PRODUCER

    /// Write the next chunk of the request body.
    ///
    /// Resolves once the producer may write again. An error means the
    /// producer must stop and drop the chunk.
    pub async fn write_request_body_part(&self, chunk: Bytes) -> Result<(), Error> {
        let action = self.lock().write_next_request_part(chunk);

        match action {
            NextWriteAction::WriteAndContinue(executor, part) => {
                executor.write(RequestPart::Body(part));
                Ok(())
            }
            NextWriteAction::WriteAndWait(executor, part) => {
                executor.write(RequestPart::Body(part));
                self.wait_for_request_body_demand().await
            }
            NextWriteAction::Fail(error, unwind) => {
                self.unwind(unwind);
                Err(error)
            }
        }
    }

    /// Wait until the executor wants more request body.
    pub async fn wait_for_request_body_demand(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        let action = self.lock().wait_for_request_body_demand(tx);

        match action {
            WaitForDemandAction::None => {}
            WaitForDemandAction::Resume(waiter) => {
                let _ = waiter.send(Ok(()));
            }
            WaitForDemandAction::Fail(waiter, error, unwind) => {
                self.unwind(unwind);
                let _ = waiter.send(Err(error));
            }
        }

        rx.await.unwrap_or(Err(Error::Cancelled))
    }

    /// The producer cannot supply more data right now.
    ///
    /// Writes are rejected until the executor resumes the stream. A body
    /// pumped from a [`RequestBody`] source holds on to the rejected chunk and
    /// writes it once resumed.
    pub fn pause_request_body_stream(&self) {
        self.lock().pause_request_body_stream();
    }

    /// The producer reached the end of the body, or failed.
    pub fn finish_request_body_stream(&self, result: Result<(), Error>) {
        let action = self.lock().finish_request_body_stream(result);

        match action {
            FinishAction::None => {}
            FinishAction::ForwardStreamFinished(executor) => executor.write(RequestPart::End),
            FinishAction::Fail(unwind) => self.unwind(unwind),
        }
    }

    fn start_stream(self: &Arc<Self>, allocator: Allocator) {
        let body = self
            .body
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();

        let source: BodyStream = match body {
            RequestBody::Empty => {
                self.finish_request_body_stream(Ok(()));
                return;
            }
            RequestBody::Bytes(data) => Box::pin(futures::stream::iter(
                split_chunks(data, allocator.chunk_size()).map(Ok::<_, Error>),
            )),
            RequestBody::Stream { source, .. } => source,
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.fail(Error::ProducerFailure(
                "no tokio runtime to produce the request body".into(),
            ));
            return;
        };

        debug!("Start request body stream");
        let task = handle.spawn(self.clone().pump(source));

        let abort = self.lock().schedule_producer(task.abort_handle());

        if let Some(task) = abort {
            task.abort();
        }
    }

    async fn pump(self: Arc<Self>, mut source: BodyStream) {
        while let Some(item) = source.next().await {
            let chunk = match item {
                Ok(v) => v,
                Err(e) => {
                    self.finish_request_body_stream(Err(e));
                    return;
                }
            };

            if chunk.is_empty() {
                continue;
            }

            if let Err(e) = self.pump_chunk(chunk).await {
                debug!("Stop request body stream: {}", e);
                return;
            }
        }

        self.finish_request_body_stream(Ok(()));
    }

    async fn pump_chunk(&self, chunk: Bytes) -> Result<(), Error> {
        loop {
            let Err(e) = self.write_request_body_part(chunk.clone()).await else {
                return Ok(());
            };

            if self.is_finished() {
                return Err(e);
            }

            // Paused by the producer side, the chunk is written again on resume.
            trace!("Request body write rejected: {}", e);
            self.wait_for_request_body_demand().await?;
        }
    }

    fn unwind(&self, action: FailAction) {
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
        if let Some(waiter) = head_waiter {
            let _ = waiter.send(Err(error.clone()));
        }
        if let Some(waiter) = request_body_waiter {
            let _ = waiter.send(Err(error.clone()));
        }
        if let Some(waiter) = response_part_waiter {
            let _ = waiter.send(Err(error));
        }
    }
}

fn split_chunks(mut data: Bytes, chunk_size: usize) -> impl Iterator<Item = Bytes> {
    std::iter::from_fn(move || {
        if data.is_empty() {
            return None;
        }
        let n = chunk_size.min(data.len());
        Some(data.split_to(n))
    })
}

/// Terminal result of a transaction.
///
/// Resolves exactly once, with the response or the error that ended the transaction.
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<Response<()>, Error>>,
}

impl ResponseFuture {
    /// Take the result without waiting, if the transaction already finished.
    pub fn try_result(&mut self) -> Option<Result<Response<()>, Error>> {
        self.rx.try_recv().ok()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response<()>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| {
            r.unwrap_or(Err(Error::ProtocolViolation(
                "transaction dropped before completion",
            )))
        })
    }
}

/// Response body parts, as a stream.
pub struct ResponseBody {
    transaction: Arc<Transaction>,
    pending: Option<oneshot::Receiver<Result<Option<Bytes>, Error>>>,
    done: bool,
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let transaction = &this.transaction;
        let rx = this.pending.get_or_insert_with(|| {
            let (tx, rx) = oneshot::channel();
            transaction.consume_next_response_part(tx);
            rx
        });

        let result = ready!(Pin::new(rx).poll(cx));
        this.pending = None;

        match result {
            Ok(Ok(Some(part))) => Poll::Ready(Some(Ok(part))),
            Ok(Ok(None)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Ok(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Err(_) => {
                this.done = true;
                Poll::Ready(Some(Err(Error::Cancelled)))
            }
        }
    }
}
