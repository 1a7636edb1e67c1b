//! A transaction's place in the connection pool's waiting list.

use std::fmt;
use std::sync::Arc;

/// Cancellable position in the pool's queue.
pub trait QueueToken: Send + Sync {
    /// Remove the waiting transaction from the pool's queue.
    fn cancel(&self);
}

/// Shared handle to a [`QueueToken`].
///
/// Two handles are equal when they point at the same token.
#[derive(Clone)]
pub struct QueueHandle(Arc<dyn QueueToken>);

impl QueueHandle {
    /// Wrap a queue token.
    pub fn new(token: Arc<dyn QueueToken>) -> Self {
        QueueHandle(token)
    }

    pub(crate) fn cancel(&self) {
        debug!("Cancel queued request");
        self.0.cancel();
    }
}

impl<T: QueueToken + 'static> From<Arc<T>> for QueueHandle {
    fn from(value: Arc<T>) -> Self {
        QueueHandle(value)
    }
}

impl PartialEq for QueueHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for QueueHandle {}

impl fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueHandle({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}
