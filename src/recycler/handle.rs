use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RecycleError;

use super::stack::StackInner;

/// An acquired pooled value. Call [`Handle::recycle`] to return it; dropping
/// a `Handle` without recycling simply drops the value (it is not pooled).
pub struct Handle<T> {
    value: Option<T>,
    stack: Arc<StackInner<T>>,
    recycled: AtomicBool,
}

impl<T> Handle<T> {
    pub(crate) fn new(value: T, stack: Arc<StackInner<T>>) -> Handle<T> {
        Handle {
            value: Some(value),
            stack,
            recycled: AtomicBool::new(false),
        }
    }

    /// Returns the value to its pool. Calling this more than once on the
    /// same handle is a programming error, detected and reported rather
    /// than silently ignored.
    pub fn recycle(mut self) -> Result<(), RecycleError> {
        if self.recycled.swap(true, Ordering::AcqRel) {
            return Err(RecycleError::DoubleRecycle);
        }
        let value = self
            .value
            .take()
            .expect("recycled flag guards single consumption of the value");
        self.stack.recycle(value);
        Ok(())
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("handle value consumed")
    }
}

impl<T> DerefMut for Handle<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("handle value consumed")
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("value", &self.value).finish()
    }
}
