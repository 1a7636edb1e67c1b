//! The transaction state machine.
//!
//! Sans-IO: every operation mutates the state and returns an action value
//! telling the caller what to do next. Nothing here calls an executor, a queue
//! token or wakes a waiter, with one exception: the terminal result channel is
//! owned by the state machine and resolved from a single place, `complete()`.

use std::fmt;
use std::mem;

use bytes::Bytes;
use http::Response;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::body::{Allocator, BodyMode};
use crate::executor::ExecutorHandle;
use crate::queue::QueueHandle;
use crate::response::ResponseHead;
use crate::Error;

/// Sending half of the terminal result channel.
pub type ResultSender = oneshot::Sender<Result<Response<()>, Error>>;

/// A consumer waiting for the response head.
pub type HeadWaiter = oneshot::Sender<Result<ResponseHead, Error>>;

/// A consumer waiting for the next response body part. `None` is end of body.
pub type PartWaiter = oneshot::Sender<Result<Option<Bytes>, Error>>;

/// A body producer waiting for demand from the executor.
pub type DemandWaiter = oneshot::Sender<Result<(), Error>>;

/// State machine for one in-flight request.
pub struct StateMachine {
    state: State,
    mode: BodyMode,
    written: u64,
    result: Option<ResultSender>,
    head_waiter: Option<HeadWaiter>,
    head: Option<ResponseHead>,
    deadline: Option<AbortHandle>,
    producer: Option<AbortHandle>,
}

enum State {
    Initialized,
    Queued(QueueHandle),
    Executing(Executing),
    Finished {
        error: Option<Error>,
        leftover: Option<Bytes>,
    },
}

struct Executing {
    executor: ExecutorHandle,
    request: RequestStream,
    response: ResponseStream,
}

enum RequestStream {
    /// The head is on its way, body production has not started.
    HeadSent,
    Producing {
        demand: bool,
    },
    Paused(Option<DemandWaiter>),
    Finished,
}

enum ResponseStream {
    /// The consumer may already wait for the first body part.
    WaitingForHead(Option<PartWaiter>),
    Streaming {
        buffered: Option<Bytes>,
        waiter: Option<PartWaiter>,
        reading_paused: bool,
    },
}

/// Result of [`StateMachine::request_was_queued`].
#[derive(Debug)]
pub enum QueuedAction {
    /// Nothing to do.
    None,
    /// The transaction is already over, remove it from the queue.
    Cancel(QueueHandle),
}

/// Result of [`StateMachine::will_execute_request`].
#[derive(Debug)]
pub enum StartExecutionAction {
    /// The executor is bound.
    None,
    /// Do not use the executor, cancel it straight away.
    Cancel(ExecutorHandle),
}

/// Result of [`StateMachine::resume_request_body_stream`].
#[derive(Debug)]
pub enum ResumeProducingAction {
    /// Nothing to do.
    None,
    /// Wake the paused producer, if it is waiting.
    ResumeStream(Option<DemandWaiter>),
    /// Start producing the body using the allocator.
    StartStream(Allocator),
}

/// Result of [`StateMachine::write_next_request_part`].
#[derive(Debug)]
pub enum NextWriteAction {
    /// Write the part, the producer can keep going.
    WriteAndContinue(ExecutorHandle, Bytes),
    /// Write the part, then the producer must wait for demand.
    WriteAndWait(ExecutorHandle, Bytes),
    /// Drop the part and stop producing. The transaction is unwound if this
    /// write ended it, otherwise the action is [`FailAction::None`].
    Fail(Error, FailAction),
}

/// Result of [`StateMachine::wait_for_request_body_demand`].
#[derive(Debug)]
pub enum WaitForDemandAction {
    /// The waiter is stored until demand returns.
    None,
    /// Demand is already there, wake the waiter.
    Resume(DemandWaiter),
    /// Fail the waiter and unwind.
    Fail(DemandWaiter, Error, FailAction),
}

/// Result of [`StateMachine::finish_request_body_stream`].
#[derive(Debug)]
pub enum FinishAction {
    /// Nothing to do.
    None,
    /// Write the end of body to the executor.
    ForwardStreamFinished(ExecutorHandle),
    /// The transaction failed.
    Fail(FailAction),
}

/// Result of [`StateMachine::receive_response_head`].
#[derive(Debug)]
pub enum ReceiveHeadAction {
    /// Head stored, nobody waiting for it yet.
    None,
    /// Hand the head to the waiting consumer.
    SucceedHead(HeadWaiter, ResponseHead),
    /// The transaction failed.
    Fail(FailAction),
}

/// Result of [`StateMachine::wait_for_response_head`].
#[derive(Debug)]
pub enum HeadAction {
    /// The waiter is stored until the head arrives.
    Wait,
    /// The head is already here.
    Succeed(HeadWaiter, ResponseHead),
    /// Fail the waiter and unwind.
    Fail(HeadWaiter, Error, FailAction),
}

/// Result of [`StateMachine::receive_response_body_part`].
#[derive(Debug)]
pub enum ReceiveBodyAction {
    /// The part was dropped, the transaction is over.
    None,
    /// Hand the part to the waiting consumer.
    Deliver(PartWaiter, Bytes),
    /// The part is buffered. Stop reading until the consumer catches up.
    PauseReading,
    /// The transaction failed.
    Fail(FailAction),
}

/// Result of [`StateMachine::consume_next_response_part`].
#[derive(Debug)]
pub enum ConsumeAction {
    /// The waiter is stored until the next part arrives.
    Wait,
    /// Hand a buffered part to the waiter. If `demand` is set, the executor
    /// must resume reading.
    Deliver {
        #[allow(missing_docs)]
        waiter: PartWaiter,
        #[allow(missing_docs)]
        part: Bytes,
        #[allow(missing_docs)]
        demand: Option<ExecutorHandle>,
    },
    /// The body is complete.
    End(PartWaiter),
    /// Fail the waiter and unwind.
    Fail(PartWaiter, Error, FailAction),
}

/// Result of [`StateMachine::succeed`].
#[derive(Debug)]
pub enum SucceedAction {
    /// Already finished.
    None,
    /// Completed. Wake whoever is still waiting.
    Finish {
        /// Consumer waiting for more body, gets end of body.
        part_waiter: Option<PartWaiter>,
        /// Producer waiting for demand, is woken and its next write fails.
        demand_waiter: Option<DemandWaiter>,
        /// Deadline timer to abort.
        deadline: Option<AbortHandle>,
        /// Request body pump to abort.
        producer: Option<AbortHandle>,
    },
    /// The transaction failed.
    Fail(FailAction),
}

/// Everything to unwind when a transaction fails.
#[derive(Debug)]
pub enum FailAction {
    /// Nothing to unwind.
    None,
    /// The transaction just failed.
    FailResponseHead {
        /// Consumer waiting for the response head.
        head_waiter: Option<HeadWaiter>,
        /// The error the transaction failed with.
        error: Error,
        /// The pool must drop the queued transaction.
        queue_token: Option<QueueHandle>,
        /// The executor must abort and release its connection.
        executor: Option<ExecutorHandle>,
        /// Producer suspended waiting for demand.
        request_body_waiter: Option<DemandWaiter>,
        /// Consumer suspended waiting for the next body part.
        response_part_waiter: Option<PartWaiter>,
        /// Deadline timer to abort.
        deadline: Option<AbortHandle>,
        /// Request body pump to abort.
        producer: Option<AbortHandle>,
    },
}

impl StateMachine {
    /// Create a state machine for a request with the given body mode.
    pub fn new(result: ResultSender, mode: BodyMode) -> Self {
        let machine = StateMachine {
            state: State::Initialized,
            mode,
            written: 0,
            result: Some(result),
            head_waiter: None,
            head: None,
            deadline: None,
            producer: None,
        };
        debug!("{:?}", machine);
        machine
    }

    /// The body production mode.
    pub fn body_mode(&self) -> BodyMode {
        self.mode
    }

    /// Tell if the transaction reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished { .. })
    }

    /// The error the transaction finished with, if it failed.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Finished { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// The pool queued the transaction.
    pub fn request_was_queued(&mut self, token: QueueHandle) -> QueuedAction {
        match &self.state {
            State::Initialized => {
                self.state = State::Queued(token);
                debug!("{:?}", self);
                QueuedAction::None
            }
            State::Queued(_) => {
                warn!("Transaction queued twice, dropping second queue entry");
                QueuedAction::Cancel(token)
            }
            State::Executing(_) => {
                // The executor won the race against the queue bookkeeping.
                debug!("Ignore queued, already executing");
                QueuedAction::None
            }
            State::Finished { .. } => QueuedAction::Cancel(token),
        }
    }

    /// The pool offers a connection.
    pub fn will_execute_request(&mut self, executor: ExecutorHandle) -> StartExecutionAction {
        match &self.state {
            State::Initialized | State::Queued(_) => {
                let request = if self.mode.has_body() {
                    RequestStream::HeadSent
                } else {
                    RequestStream::Finished
                };
                // Replacing Queued drops the token, it has been consumed by the pool.
                self.state = State::Executing(Executing {
                    executor,
                    request,
                    response: ResponseStream::WaitingForHead(None),
                });
                debug!("{:?}", self);
                StartExecutionAction::None
            }
            State::Executing(_) => {
                warn!("Transaction offered a second executor");
                StartExecutionAction::Cancel(executor)
            }
            State::Finished { .. } => {
                debug!("Transaction already finished, cancel offered executor");
                StartExecutionAction::Cancel(executor)
            }
        }
    }

    /// A timer task that ends the transaction with [`Error::DeadlineExceeded`].
    ///
    /// Returns a task to abort: the given one if the transaction already
    /// finished, or the one it replaces.
    pub fn schedule_deadline(&mut self, task: AbortHandle) -> Option<AbortHandle> {
        if self.is_finished() {
            return Some(task);
        }
        self.deadline.replace(task)
    }

    /// The task pumping the request body from its source.
    ///
    /// Returns the task to abort if the transaction already finished.
    pub fn schedule_producer(&mut self, task: AbortHandle) -> Option<AbortHandle> {
        if self.is_finished() {
            return Some(task);
        }
        self.producer.replace(task)
    }

    /// The executor is ready to accept request body bytes.
    pub fn resume_request_body_stream(&mut self) -> ResumeProducingAction {
        let State::Executing(ex) = &mut self.state else {
            return ResumeProducingAction::None;
        };

        let action = match &mut ex.request {
            RequestStream::HeadSent => {
                ex.request = RequestStream::Producing { demand: true };
                ResumeProducingAction::StartStream(ex.executor.allocator())
            }
            RequestStream::Paused(waiter) => {
                let waiter = waiter.take();
                ex.request = RequestStream::Producing { demand: true };
                ResumeProducingAction::ResumeStream(waiter)
            }
            RequestStream::Producing { demand } => {
                *demand = true;
                return ResumeProducingAction::None;
            }
            RequestStream::Finished => return ResumeProducingAction::None,
        };

        debug!("{:?}", self);
        action
    }

    /// The executor has no demand for more request body bytes.
    pub fn withdraw_request_body_demand(&mut self) {
        if let State::Executing(Executing {
            request: RequestStream::Producing { demand },
            ..
        }) = &mut self.state
        {
            trace!("Request body demand withdrawn");
            *demand = false;
        }
    }

    /// The producer has a chunk to write.
    ///
    /// A write while paused is rejected without ending the transaction, the
    /// producer must wait for [`resume_request_body_stream`] before writing again.
    ///
    /// [`resume_request_body_stream`]: StateMachine::resume_request_body_stream
    pub fn write_next_request_part(&mut self, part: Bytes) -> NextWriteAction {
        let outcome = match &mut self.state {
            State::Finished { error, .. } => {
                let error = error.clone().unwrap_or(Error::Cancelled);
                return NextWriteAction::Fail(error, FailAction::None);
            }
            State::Initialized | State::Queued(_) => Err(Error::ProtocolViolation(
                "request body written before a connection was bound",
            )),
            State::Executing(ex) => match &mut ex.request {
                RequestStream::Producing { demand } => {
                    let written = self.written + part.len() as u64;

                    match self.mode.length() {
                        Some(expected) if written > expected => {
                            Err(Error::BodyLengthMismatch { expected, written })
                        }
                        _ => {
                            self.written = written;
                            let executor = ex.executor.clone();
                            if *demand {
                                Ok(NextWriteAction::WriteAndContinue(executor, part))
                            } else {
                                ex.request = RequestStream::Paused(None);
                                Ok(NextWriteAction::WriteAndWait(executor, part))
                            }
                        }
                    }
                }
                RequestStream::Paused(_) => {
                    let error =
                        Error::ProtocolViolation("request body written while the stream is paused");
                    warn!("{}", error);
                    return NextWriteAction::Fail(error, FailAction::None);
                }
                RequestStream::HeadSent => Err(Error::ProtocolViolation(
                    "request body written before the stream started",
                )),
                RequestStream::Finished => Err(Error::ProtocolViolation(
                    "request body written after the end of body",
                )),
            },
        };

        match outcome {
            Ok(action) => {
                if matches!(action, NextWriteAction::WriteAndWait(..)) {
                    debug!("{:?}", self);
                }
                action
            }
            Err(e) => {
                let unwind = self.violation(e.clone());
                NextWriteAction::Fail(e, unwind)
            }
        }
    }

    /// The producer waits for demand after being told to wait or pausing.
    pub fn wait_for_request_body_demand(&mut self, waiter: DemandWaiter) -> WaitForDemandAction {
        let outcome = match &mut self.state {
            State::Finished { error, .. } => {
                let error = error.clone().unwrap_or(Error::Cancelled);
                return WaitForDemandAction::Fail(waiter, error, FailAction::None);
            }
            State::Executing(ex) => match &mut ex.request {
                RequestStream::Paused(slot) => {
                    if slot.is_none() {
                        *slot = Some(waiter);
                        return WaitForDemandAction::None;
                    }
                    Error::ProtocolViolation("request body demand awaited twice")
                }
                RequestStream::Producing { .. } => return WaitForDemandAction::Resume(waiter),
                RequestStream::HeadSent | RequestStream::Finished => {
                    Error::ProtocolViolation("request body demand awaited outside of streaming")
                }
            },
            State::Initialized | State::Queued(_) => Error::ProtocolViolation(
                "request body demand awaited before a connection was bound",
            ),
        };

        let unwind = self.violation(outcome.clone());
        WaitForDemandAction::Fail(waiter, outcome, unwind)
    }

    /// The producer cannot supply more data right now.
    pub fn pause_request_body_stream(&mut self) {
        if let State::Executing(ex) = &mut self.state {
            if let RequestStream::Producing { .. } = ex.request {
                ex.request = RequestStream::Paused(None);
                debug!("{:?}", self);
                return;
            }
        }
        trace!("Ignore pause in {:?}", self);
    }

    /// The producer reached the end of the body, or failed.
    pub fn finish_request_body_stream(&mut self, result: Result<(), Error>) -> FinishAction {
        if self.is_finished() {
            return FinishAction::None;
        }

        if let Err(e) = result {
            return FinishAction::Fail(self.fail(e));
        }

        let outcome = match &mut self.state {
            State::Executing(ex) => match ex.request {
                RequestStream::Producing { .. } | RequestStream::Paused(None) => {
                    match self.mode.length() {
                        Some(expected) if expected != self.written => {
                            Err(Error::BodyLengthMismatch {
                                expected,
                                written: self.written,
                            })
                        }
                        _ => {
                            ex.request = RequestStream::Finished;
                            Ok(FinishAction::ForwardStreamFinished(ex.executor.clone()))
                        }
                    }
                }
                RequestStream::Paused(Some(_)) => Err(Error::ProtocolViolation(
                    "request body finished while waiting for demand",
                )),
                RequestStream::HeadSent => Err(Error::ProtocolViolation(
                    "request body finished before the stream started",
                )),
                RequestStream::Finished => {
                    Err(Error::ProtocolViolation("request body finished twice"))
                }
            },
            _ => Err(Error::ProtocolViolation(
                "request body finished before a connection was bound",
            )),
        };

        match outcome {
            Ok(action) => {
                debug!("{:?}", self);
                action
            }
            Err(e @ Error::BodyLengthMismatch { .. }) => FinishAction::Fail(self.fail(e)),
            Err(e) => FinishAction::Fail(self.violation(e)),
        }
    }

    /// The executor received the response head.
    pub fn receive_response_head(&mut self, head: ResponseHead) -> ReceiveHeadAction {
        let violation = match &mut self.state {
            State::Finished { .. } => {
                trace!("Drop late response head");
                return ReceiveHeadAction::None;
            }
            State::Executing(ex) => match &mut ex.response {
                ResponseStream::WaitingForHead(waiter) => {
                    let waiter = waiter.take();
                    ex.response = ResponseStream::Streaming {
                        buffered: None,
                        waiter,
                        reading_paused: false,
                    };
                    self.head = Some(head.clone());
                    debug!("{:?}", self);

                    return match self.head_waiter.take() {
                        Some(waiter) => ReceiveHeadAction::SucceedHead(waiter, head),
                        None => ReceiveHeadAction::None,
                    };
                }
                ResponseStream::Streaming { .. } => "response head received twice",
            },
            State::Initialized | State::Queued(_) => {
                "response head received before a connection was bound"
            }
        };

        ReceiveHeadAction::Fail(self.violation(Error::ProtocolViolation(violation)))
    }

    /// The consumer waits for the response head.
    pub fn wait_for_response_head(&mut self, waiter: HeadWaiter) -> HeadAction {
        if let Some(head) = &self.head {
            return HeadAction::Succeed(waiter, head.clone());
        }

        if let State::Finished { error, .. } = &self.state {
            let error = error
                .clone()
                .unwrap_or(Error::ProtocolViolation("finished without a response head"));
            return HeadAction::Fail(waiter, error, FailAction::None);
        }

        if self.head_waiter.is_some() {
            let error = Error::ProtocolViolation("response head awaited twice");
            let unwind = self.violation(error.clone());
            return HeadAction::Fail(waiter, error, unwind);
        }

        self.head_waiter = Some(waiter);
        HeadAction::Wait
    }

    /// The executor read a response body part.
    pub fn receive_response_body_part(&mut self, part: Bytes) -> ReceiveBodyAction {
        let violation = match &mut self.state {
            State::Finished { .. } => {
                trace!("Drop late response body part");
                return ReceiveBodyAction::None;
            }
            State::Executing(ex) => match &mut ex.response {
                ResponseStream::Streaming {
                    buffered,
                    waiter,
                    reading_paused,
                } => {
                    if let Some(waiter) = waiter.take() {
                        return ReceiveBodyAction::Deliver(waiter, part);
                    }
                    if buffered.is_none() {
                        *buffered = Some(part);
                        *reading_paused = true;
                        trace!("Buffer response body part, pause reading");
                        return ReceiveBodyAction::PauseReading;
                    }
                    "response body part received while reading is paused"
                }
                ResponseStream::WaitingForHead(_) => {
                    "response body part received before the head"
                }
            },
            State::Initialized | State::Queued(_) => {
                "response body part received before a connection was bound"
            }
        };

        ReceiveBodyAction::Fail(self.violation(Error::ProtocolViolation(violation)))
    }

    /// The consumer wants the next response body part.
    pub fn consume_next_response_part(&mut self, waiter: PartWaiter) -> ConsumeAction {
        let violation = match &mut self.state {
            State::Finished { error, leftover } => {
                if let Some(part) = leftover.take() {
                    return ConsumeAction::Deliver {
                        waiter,
                        part,
                        demand: None,
                    };
                }
                return match error {
                    None => ConsumeAction::End(waiter),
                    Some(e) => ConsumeAction::Fail(waiter, e.clone(), FailAction::None),
                };
            }
            State::Executing(ex) => match &mut ex.response {
                ResponseStream::Streaming {
                    buffered,
                    waiter: slot,
                    reading_paused,
                } => {
                    if let Some(part) = buffered.take() {
                        let demand = if mem::replace(reading_paused, false) {
                            Some(ex.executor.clone())
                        } else {
                            None
                        };
                        return ConsumeAction::Deliver {
                            waiter,
                            part,
                            demand,
                        };
                    }
                    if slot.is_none() {
                        *slot = Some(waiter);
                        return ConsumeAction::Wait;
                    }
                    "response body part awaited twice"
                }
                ResponseStream::WaitingForHead(slot) => {
                    if slot.is_none() {
                        *slot = Some(waiter);
                        return ConsumeAction::Wait;
                    }
                    "response body part awaited twice"
                }
            },
            State::Initialized | State::Queued(_) => {
                "response body consumed before a connection was bound"
            }
        };

        let error = Error::ProtocolViolation(violation);
        let unwind = self.violation(error.clone());
        ConsumeAction::Fail(waiter, error, unwind)
    }

    /// The response completed normally.
    pub fn succeed(&mut self) -> SucceedAction {
        let previous = mem::replace(
            &mut self.state,
            State::Finished {
                error: None,
                leftover: None,
            },
        );

        let (request, buffered, part_waiter) = match previous {
            State::Executing(Executing {
                request,
                response:
                    ResponseStream::Streaming {
                        buffered, waiter, ..
                    },
                ..
            }) => (request, buffered, waiter),
            previous => {
                self.state = previous;
                let violation = match &self.state {
                    State::Finished { .. } => return SucceedAction::None,
                    State::Executing(_) => "succeeded before the response head",
                    State::Initialized | State::Queued(_) => {
                        "succeeded before a connection was bound"
                    }
                };
                return SucceedAction::Fail(self.violation(Error::ProtocolViolation(violation)));
            }
        };

        let demand_waiter = match request {
            RequestStream::Paused(waiter) => waiter,
            RequestStream::HeadSent | RequestStream::Producing { .. } => {
                debug!("Response complete before request body, abandon producer");
                None
            }
            RequestStream::Finished => None,
        };

        self.state = State::Finished {
            error: None,
            leftover: buffered,
        };
        debug!("{:?}", self);

        let response = self
            .head
            .clone()
            .map(ResponseHead::into_response)
            .ok_or(Error::ProtocolViolation("finished without a response head"));
        self.complete(response);

        SucceedAction::Finish {
            part_waiter,
            demand_waiter,
            deadline: self.deadline.take(),
            producer: self.producer.take(),
        }
    }

    /// Fail the transaction. A no-op if it already finished.
    pub fn fail(&mut self, error: Error) -> FailAction {
        if self.is_finished() {
            trace!("Ignore fail, already finished: {}", error);
            return FailAction::None;
        }

        let previous = mem::replace(
            &mut self.state,
            State::Finished {
                error: Some(error.clone()),
                leftover: None,
            },
        );

        let mut queue_token = None;
        let mut executor = None;
        let mut request_body_waiter = None;
        let mut response_part_waiter = None;

        match previous {
            State::Initialized | State::Finished { .. } => {}
            State::Queued(token) => queue_token = Some(token),
            State::Executing(ex) => {
                executor = Some(ex.executor);
                if let RequestStream::Paused(waiter) = ex.request {
                    request_body_waiter = waiter;
                }
                response_part_waiter = match ex.response {
                    ResponseStream::WaitingForHead(waiter) => waiter,
                    ResponseStream::Streaming { waiter, .. } => waiter,
                };
            }
        }

        debug!("{:?}: {}", self, error);

        self.complete(Err(error.clone()));

        FailAction::FailResponseHead {
            head_waiter: self.head_waiter.take(),
            error,
            queue_token,
            executor,
            request_body_waiter,
            response_part_waiter,
            deadline: self.deadline.take(),
            producer: self.producer.take(),
        }
    }

    /// The caller cancelled the request.
    pub fn cancel(&mut self) -> FailAction {
        self.fail(Error::Cancelled)
    }

    /// The request deadline passed.
    pub fn deadline_exceeded(&mut self) -> FailAction {
        self.fail(Error::DeadlineExceeded)
    }

    fn violation(&mut self, error: Error) -> FailAction {
        warn!("{:?}: {}", self, error);
        self.fail(error)
    }

    /// Resolve the terminal result channel. Only ever called once.
    fn complete(&mut self, outcome: Result<Response<()>, Error>) {
        let Some(result) = self.result.take() else {
            warn!("Transaction result already resolved");
            return;
        };

        if result.send(outcome).is_err() {
            debug!("Response future dropped before completion");
        }
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction<{:?}>", self.state)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Initialized => write!(f, "Initialized"),
            State::Queued(_) => write!(f, "Queued"),
            State::Executing(ex) => write!(f, "Executing({:?}, {:?})", ex.request, ex.response),
            State::Finished { error: None, .. } => write!(f, "Succeeded"),
            State::Finished { error: Some(e), .. } if e.is_cancellation() => {
                write!(f, "Cancelled")
            }
            State::Finished { .. } => write!(f, "Failed"),
        }
    }
}

impl fmt::Debug for RequestStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStream::HeadSent => write!(f, "HeadSent"),
            RequestStream::Producing { demand: true } => write!(f, "BodyReady"),
            RequestStream::Producing { demand: false } => write!(f, "BodyReadyNoDemand"),
            RequestStream::Paused(_) => write!(f, "BodyPaused"),
            RequestStream::Finished => write!(f, "BodySent"),
        }
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStream::WaitingForHead(_) => write!(f, "WaitingForHead"),
            ResponseStream::Streaming {
                reading_paused: true,
                ..
            } => write!(f, "StreamingPaused"),
            ResponseStream::Streaming { .. } => write!(f, "Streaming"),
        }
    }
}
