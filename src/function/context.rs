//! Execution context passed to handlers.
//!
//! A [`Context`] is an immutable chain of scopes. Each scope may add a typed
//! value, tighten the deadline, or introduce a cancellation point. Deriving a
//! child never mutates the parent, so a single base context can be shared by
//! every concurrent invocation loop.

use crate::function::lambda_context::{LambdaContext, TraceId};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Per-invocation execution context.
#[derive(Clone, Default)]
pub struct Context {
    scope: Option<Arc<Scope>>,
}

struct Scope {
    parent: Context,
    deadline: Option<SystemTime>,
    value: Option<Arc<dyn Any + Send + Sync>>,
    cancel: Option<CancellationToken>,
}

impl Context {
    /// An empty root context: no deadline, no values, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    fn derive(
        &self,
        deadline: Option<SystemTime>,
        value: Option<Arc<dyn Any + Send + Sync>>,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            scope: Some(Arc::new(Scope {
                parent: self.clone(),
                deadline,
                value,
                cancel,
            })),
        }
    }

    /// Derive a child carrying `value`. Lookups by type find the innermost one.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.derive(None, Some(Arc::new(value)), None)
    }

    /// Derive a cancellable child.
    ///
    /// Cancelling the parent cancels the child; the reverse does not hold.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.child_token();
        let ctx = self.derive(None, None, Some(token.clone()));
        (ctx, CancelHandle { token })
    }

    /// Derive a cancellable child whose deadline is the earlier of `deadline`
    /// and any inherited one.
    pub fn with_deadline(&self, deadline: SystemTime) -> (Self, CancelHandle) {
        let deadline = match self.deadline() {
            Some(inherited) if inherited < deadline => inherited,
            _ => deadline,
        };
        let token = self.child_token();
        let ctx = self.derive(Some(deadline), None, Some(token.clone()));
        (ctx, CancelHandle { token })
    }

    /// Shorthand for `with_deadline(now + timeout)`.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.with_deadline(SystemTime::now() + timeout)
    }

    /// Look up the innermost value of type `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        let mut current = self;
        while let Some(scope) = &current.scope {
            if let Some(value) = scope.value.as_ref().and_then(|v| v.downcast_ref::<T>()) {
                return Some(value);
            }
            current = &scope.parent;
        }
        None
    }

    /// The effective deadline, if any scope set one.
    pub fn deadline(&self) -> Option<SystemTime> {
        let mut current = self;
        while let Some(scope) = &current.scope {
            // Deadlines only ever tighten, so the innermost one wins.
            if scope.deadline.is_some() {
                return scope.deadline;
            }
            current = &scope.parent;
        }
        None
    }

    /// Time left until the deadline, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline().map(|deadline| {
            deadline
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }

    /// `None` while the context is live, otherwise the reason it is done.
    pub fn err(&self) -> Option<ContextError> {
        if self.nearest_cancel().is_some_and(CancellationToken::is_cancelled) {
            return Some(ContextError::Canceled);
        }
        match self.deadline() {
            Some(deadline) if SystemTime::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// A context with neither a cancellation point nor a deadline never
    /// resolves.
    pub async fn done(&self) -> ContextError {
        let cancel = self.nearest_cancel();
        let sleep = async {
            match self.remaining() {
                Some(remaining) => tokio::time::sleep(remaining).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancelled => ContextError::Canceled,
            _ = sleep => ContextError::DeadlineExceeded,
        }
    }

    /// Invocation metadata, present inside a handler.
    pub fn lambda_context(&self) -> Option<&LambdaContext> {
        self.value::<LambdaContext>()
    }

    /// The request id of the current invoke.
    pub fn request_id(&self) -> Option<&str> {
        self.lambda_context().map(|lc| lc.aws_request_id.as_str())
    }

    /// The trace header value of the current invoke.
    pub fn trace_id(&self) -> Option<&str> {
        self.value::<TraceId>().map(|id| id.0.as_str())
    }

    fn child_token(&self) -> CancellationToken {
        match self.nearest_cancel() {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        }
    }

    fn nearest_cancel(&self) -> Option<&CancellationToken> {
        let mut current = self;
        while let Some(scope) = &current.scope {
            if scope.cancel.is_some() {
                return scope.cancel.as_ref();
            }
            current = &scope.parent;
        }
        None
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline())
            .field("err", &self.err())
            .field("request_id", &self.request_id())
            .finish()
    }
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel` has been called, directly or through a parent.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
