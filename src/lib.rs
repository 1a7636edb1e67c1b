//! Request execution core for HTTP clients.
//!
//! This crate governs the lifecycle of one outgoing request, from the moment it
//! is submitted until exactly one terminal outcome is delivered: a response, a
//! failure, or a cancellation.
//!
//! It reconciles three activities that run at their own pace:
//!
//! * waiting for the pool to hand over a connection
//! * streaming the request body, paced by the connection
//! * streaming the response body, paced by the consumer
//!
//! The pool, the connection driver and the body source are collaborators behind
//! small interfaces ([`QueueToken`], [`RequestExecutor`], [`RequestBody`]). The
//! [`StateMachine`](transaction::state::StateMachine) is sans-IO: every event
//! returns an action value, and [`Transaction`] performs those actions.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │   Initialized    │─────────────────┐
//!                  └──────────────────┘                 │
//!                            │                          │
//!                            ▼                          │
//!                  ┌──────────────────┐                 │
//!                  │      Queued      │                 │
//!                  └──────────────────┘                 │
//!                            │                          │
//!                            ▼                          │
//! ┌──────────────────────────────────────────────────┐  │
//! │ Executing                                        │◀─┘
//! │                                                  │
//! │   request:  HeadSent ─▶ BodyReady ⇄ BodyPaused   │
//! │                             │                    │
//! │                             ▼                    │
//! │                          BodySent                │
//! │                                                  │
//! │   response: WaitingForHead ─▶ Streaming          │
//! └──────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//!                  ┌──────────────────┐
//!                  │     Finished     │  Succeeded | Failed | Cancelled
//!                  └──────────────────┘
//! ```
//!
//! Failure and cancellation reach `Finished` from every state.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use reqtxn::*;
//! use reqtxn::http::{Request, StatusCode};
//!
//! struct Connection;
//!
//! impl RequestExecutor for Connection {
//!     fn write_request_body_part(&self, _part: RequestPart) {}
//!     fn demand_response_body_stream(&self) {}
//!     fn cancel_request(&self) {}
//! }
//!
//! let request = Request::get("http://example.test/")
//!     .body(RequestBody::Empty)
//!     .unwrap();
//!
//! let (transaction, mut response) = Transaction::new(PreparedRequest::new(request).unwrap());
//!
//! // The pool binds a connection.
//! assert!(transaction.will_execute_request(Arc::new(Connection).into()));
//!
//! // The connection reads the response.
//! transaction.receive_response_head(ResponseHead::new(StatusCode::OK));
//! transaction.succeed_request();
//!
//! let response = response.try_result().unwrap().unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//!
//! // Late events are ignored.
//! transaction.cancel();
//! ```
//!
//! # Out of scope:
//!
//! * Connection pooling, reuse and eviction
//! * Byte I/O and TLS
//! * Choosing between HTTP/1 and multiplexed transports
//! * Proxies
//! * Retries. A retry is a new transaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod error;
pub use error::Error;

mod ext;

mod body;
pub use body::{Allocator, BodyMode, BodyStream, RequestBody, RequestPart, DEFAULT_CHUNK_SIZE};

mod executor;
pub use executor::{ExecutorHandle, RequestExecutor};

mod queue;
pub use queue::{QueueHandle, QueueToken};

mod request;
pub use request::{PreparedRequest, RequestHead};

mod response;
pub use response::ResponseHead;

pub mod transaction;
pub use transaction::{ReadAction, ResponseBody, ResponseFuture, Transaction};

pub use http;
