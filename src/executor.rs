//! The connection driver a transaction is bound to while executing.

use std::fmt;
use std::sync::Arc;

use crate::body::{Allocator, RequestPart};

/// Capabilities of a connection driver that executes a request.
///
/// Implemented by the real connection and by test doubles. The transaction
/// never sees a concrete connection type, only this interface.
///
/// Calls are made without holding the transaction's lock, so an executor may
/// call straight back into the transaction.
pub trait RequestExecutor: Send + Sync {
    /// Write a part of the request body to the connection.
    fn write_request_body_part(&self, part: RequestPart);

    /// The consumer caught up; resume reading response body parts.
    fn demand_response_body_stream(&self);

    /// Abort the request and release the connection.
    fn cancel_request(&self);

    /// Allocator handed to the body producer when it starts.
    fn allocator(&self) -> Allocator {
        Allocator::default()
    }
}

/// Shared handle to a bound [`RequestExecutor`].
///
/// Two handles are equal when they point at the same executor.
#[derive(Clone)]
pub struct ExecutorHandle(Arc<dyn RequestExecutor>);

impl ExecutorHandle {
    /// Wrap an executor.
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        ExecutorHandle(executor)
    }

    pub(crate) fn write(&self, part: RequestPart) {
        if let RequestPart::Body(v) = &part {
            trace!("Write request body part: {} bytes", v.len());
        } else {
            trace!("Write request body end");
        }
        self.0.write_request_body_part(part);
    }

    pub(crate) fn demand_response_body(&self) {
        trace!("Demand more response body");
        self.0.demand_response_body_stream();
    }

    pub(crate) fn cancel(&self) {
        debug!("Cancel request on executor");
        self.0.cancel_request();
    }

    pub(crate) fn allocator(&self) -> Allocator {
        self.0.allocator()
    }
}

impl<E: RequestExecutor + 'static> From<Arc<E>> for ExecutorHandle {
    fn from(value: Arc<E>) -> Self {
        ExecutorHandle(value)
    }
}

impl PartialEq for ExecutorHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ExecutorHandle {}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutorHandle({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}
