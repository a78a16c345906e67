//! Context-scoped hooks around handler dispatch.
//!
//! Instrumentation libraries attach a [`HandlerTrace`] to the base context to
//! observe the decoded request just before the handler runs and the handler's
//! return value just after. Hooks attached at different layers compose: the
//! outermost fires first, the innermost last.

use crate::function::context::Context;
use std::any::Any;
use std::sync::Arc;

/// Callback receiving the invoke context and a type-erased event.
pub type TraceHook = Arc<dyn Fn(&Context, &dyn Any) + Send + Sync>;

/// Request/response hooks.
#[derive(Clone, Default)]
pub struct HandlerTrace {
    request_event: Option<TraceHook>,
    response_event: Option<TraceHook>,
}

impl HandlerTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the decoded request. Downcast the event to the handler's
    /// input type.
    pub fn on_request(mut self, hook: impl Fn(&Context, &dyn Any) + Send + Sync + 'static) -> Self {
        self.request_event = Some(Arc::new(hook));
        self
    }

    /// Called with the handler's successful return value.
    pub fn on_response(
        mut self,
        hook: impl Fn(&Context, &dyn Any) + Send + Sync + 'static,
    ) -> Self {
        self.response_event = Some(Arc::new(hook));
        self
    }

    /// Derive a context carrying these hooks, composed after any already
    /// present in `ctx`.
    pub fn attach(self, ctx: &Context) -> Context {
        let composed = match ctx.value::<HandlerTrace>() {
            Some(outer) => HandlerTrace {
                request_event: chain(outer.request_event.clone(), self.request_event),
                response_event: chain(outer.response_event.clone(), self.response_event),
            },
            None => self,
        };
        ctx.with_value(composed)
    }

    pub(crate) fn request(ctx: &Context, event: &dyn Any) {
        if let Some(hook) = ctx.value::<HandlerTrace>().and_then(|t| t.request_event.as_ref()) {
            hook(ctx, event);
        }
    }

    pub(crate) fn response(ctx: &Context, event: &dyn Any) {
        if let Some(hook) = ctx.value::<HandlerTrace>().and_then(|t| t.response_event.as_ref()) {
            hook(ctx, event);
        }
    }
}

impl std::fmt::Debug for HandlerTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTrace")
            .field("request_event", &self.request_event.is_some())
            .field("response_event", &self.response_event.is_some())
            .finish()
    }
}

fn chain(first: Option<TraceHook>, second: Option<TraceHook>) -> Option<TraceHook> {
    match (first, second) {
        (Some(first), Some(second)) => Some(Arc::new(move |ctx: &Context, event: &dyn Any| {
            first(ctx, event);
            second(ctx, event);
        })),
        (first, None) => first,
        (None, second) => second,
    }
}
