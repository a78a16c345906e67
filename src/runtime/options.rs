//! Options accepted by [`crate::start_with_options`].

use crate::function::codec::JsonCodec;
use crate::function::context::Context;
use std::sync::Arc;

/// A callback run on shutdown or before re-exec.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handler and runtime options.
///
/// ```
/// use lambda_rt::HandlerOptions;
///
/// let options = HandlerOptions::new()
///     .escape_html(false)
///     .indent("", "  ")
///     .on_sigterm(|| println!("shutting down"));
/// ```
#[derive(Clone, Default)]
pub struct HandlerOptions {
    base_context: Context,
    codec: JsonCodec,
    enable_sigterm: bool,
    sigterm_callbacks: Vec<Callback>,
    pre_exec_callbacks: Vec<Callback>,
    concurrency: Option<usize>,
}

impl HandlerOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context every invoke context is derived from.
    pub fn base_context(mut self, ctx: Context) -> Self {
        self.base_context = ctx;
        self
    }

    /// Escape `<`, `>` and `&` in JSON output. On by default.
    pub fn escape_html(mut self, escape: bool) -> Self {
        self.codec.escape_html = escape;
        self
    }

    /// Pretty-print JSON output. Both strings must be JSON whitespace.
    pub fn indent(mut self, prefix: impl Into<String>, indent: impl Into<String>) -> Self {
        self.codec.prefix = prefix.into();
        self.codec.indent = indent.into();
        self
    }

    /// Fail invokes whose payload has fields the input type does not declare.
    pub fn disallow_unknown_fields(mut self, disallow: bool) -> Self {
        self.codec.disallow_unknown_fields = disallow;
        self
    }

    /// Keep exact number text when decoding into untyped values. Handlers
    /// reject every invoke unless the crate is built with `use-number`.
    pub fn use_number(mut self, use_number: bool) -> Self {
        self.codec.use_number = use_number;
        self
    }

    /// Register an internal extension so the process receives SIGTERM
    /// before shutdown.
    pub fn enable_sigterm(mut self) -> Self {
        self.enable_sigterm = true;
        self
    }

    /// Run `callback` on SIGTERM. Implies [`enable_sigterm`](Self::enable_sigterm).
    pub fn on_sigterm(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.enable_sigterm = true;
        self.sigterm_callbacks.push(Arc::new(callback));
        self
    }

    /// Run `callback` right before the process replaces itself with the
    /// exec wrapper.
    pub fn on_pre_exec(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_exec_callbacks.push(Arc::new(callback));
        self
    }

    /// Number of concurrent invocation loops. Overrides
    /// `AWS_LAMBDA_MAX_CONCURRENCY`.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }

    pub fn context(&self) -> &Context {
        &self.base_context
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub fn sigterm_enabled(&self) -> bool {
        self.enable_sigterm
    }

    pub(crate) fn sigterm_callbacks(&self) -> &[Callback] {
        &self.sigterm_callbacks
    }

    pub(crate) fn pre_exec_callbacks(&self) -> &[Callback] {
        &self.pre_exec_callbacks
    }

    pub(crate) fn concurrency_override(&self) -> Option<usize> {
        self.concurrency
    }
}

impl std::fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("codec", &self.codec)
            .field("enable_sigterm", &self.enable_sigterm)
            .field("sigterm_callbacks", &self.sigterm_callbacks.len())
            .field("pre_exec_callbacks", &self.pre_exec_callbacks.len())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}
