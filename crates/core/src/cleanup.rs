//! Deferred teardown actions.
//!
//! Each acquired resource registers one [`CleanupHandle`] on a
//! [`CleanupStack`]; the stack runs them newest first.
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::admin::AdminService;
use crate::reap::{Target, reap_own};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A run-once teardown action for one resource. Running it never fails;
/// whatever goes wrong inside is logged by the action itself.
pub struct CleanupHandle {
    name: String,
    action: Action,
}

impl CleanupHandle {
    pub fn new<F, Fut>(name: &str, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            action: Box::new(move || action().boxed()),
        }
    }

    /// A handle that deletes `target` through `service`.
    pub fn delete(service: Arc<dyn AdminService>, target: Target) -> Self {
        let name = target.path().to_string();
        Self::new(&name, move || async move {
            reap_own(service.as_ref(), &target).await;
        })
    }

    /// Path of the resource this handle tears down.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self) {
        debug!("Running cleanup for {}", self.name);
        (self.action)().await;
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CleanupStack {
    handles: Vec<CleanupHandle>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: CleanupHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Names of pending handles in the order they will run.
    pub fn pending(&self) -> Vec<&str> {
        self.handles.iter().rev().map(CleanupHandle::name).collect()
    }

    /// Runs every pending handle, most recently pushed first.
    pub async fn run_all(&mut self) {
        while let Some(handle) = self.handles.pop() {
            handle.run().await;
        }
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        for name in self.pending() {
            warn!("Cleanup for {name} never ran, the resource is leaked until the next stale sweep");
        }
    }
}
