//! Handler trait and the adapters that turn async functions into handlers.
//!
//! Any of the four shapes below can be adapted:
//!
//! | builder       | function                      |
//! |---------------|-------------------------------|
//! | [`unit_fn`]    | `async fn() -> R`              |
//! | [`context_fn`] | `async fn(Context) -> R`       |
//! | [`input_fn`]   | `async fn(TIn) -> R`           |
//! | [`handler_fn`] | `async fn(Context, TIn) -> R`  |
//!
//! `TIn` is any `DeserializeOwned` type and is decoded from the invoke
//! payload as JSON. `R` is `()` or `Result<T, E>` where `E` converts into
//! [`InvocationError`] and `T` is either serializable (encoded as JSON) or a
//! ready-made [`Response`] / [`StreamingResponse`] (passed through).

use crate::error::{InvocationError, ENCODE_ERROR};
use crate::function::codec::JsonCodec;
use crate::function::context::Context;
use crate::function::trace::HandlerTrace;
use crate::http::{Response, StreamingResponse};
use crate::runtime::HandlerOptions;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A function invoked once per invoke.
///
/// Most handlers are built with [`handler_fn`] and friends. Implement the
/// trait directly to work with raw payload bytes.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one invoke.
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError>;

    /// Called once before the first invoke with the options the runtime was
    /// started with.
    fn configure(&mut self, options: &HandlerOptions) {
        let _ = options;
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError> {
        (**self).invoke(ctx, payload).await
    }

    fn configure(&mut self, options: &HandlerOptions) {
        (**self).configure(options);
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError> {
        (**self).invoke(ctx, payload).await
    }

    /// Only takes effect while the handler is not shared yet.
    fn configure(&mut self, options: &HandlerOptions) {
        if let Some(inner) = Arc::get_mut(self) {
            inner.configure(options);
        }
    }
}

/// Marker for results encoded as JSON.
pub enum Serialized {}
/// Marker for results that already are a [`Response`].
pub enum Passthrough {}
/// Marker for handlers returning `()`.
pub enum NoOutput {}

/// A successful handler value that can become a [`Response`].
pub trait IntoResponse<M>: Send + 'static {
    fn into_response(self, codec: &JsonCodec) -> Result<Response, InvocationError>;
}

impl<T: Serialize + Send + 'static> IntoResponse<Serialized> for T {
    fn into_response(self, codec: &JsonCodec) -> Result<Response, InvocationError> {
        codec
            .encode(&self)
            .map(Response::json)
            .map_err(|e| InvocationError::new(ENCODE_ERROR, e.to_string()))
    }
}

impl IntoResponse<Passthrough> for Response {
    fn into_response(self, _codec: &JsonCodec) -> Result<Response, InvocationError> {
        Ok(self)
    }
}

impl IntoResponse<Passthrough> for StreamingResponse {
    fn into_response(self, _codec: &JsonCodec) -> Result<Response, InvocationError> {
        Ok(self.encode())
    }
}

/// What an adapted function may return.
pub trait HandlerOutput<M>: Send {
    fn into_result(self, ctx: &Context, codec: &JsonCodec) -> Result<Response, InvocationError>;
}

impl HandlerOutput<NoOutput> for () {
    fn into_result(self, ctx: &Context, codec: &JsonCodec) -> Result<Response, InvocationError> {
        HandlerTrace::response(ctx, &());
        IntoResponse::<Serialized>::into_response((), codec)
    }
}

impl<T, E, M> HandlerOutput<M> for Result<T, E>
where
    T: IntoResponse<M>,
    E: Into<InvocationError> + Send,
{
    fn into_result(self, ctx: &Context, codec: &JsonCodec) -> Result<Response, InvocationError> {
        let value = self.map_err(Into::into)?;
        HandlerTrace::response(ctx, &value);
        value.into_response(codec)
    }
}

/// Shape marker: `async fn()`.
pub struct NoArgs;
/// Shape marker: `async fn(Context)`.
pub struct ContextOnly;
/// Shape marker: `async fn(TIn)`.
pub struct InputOnly<TIn>(PhantomData<fn() -> TIn>);
/// Shape marker: `async fn(Context, TIn)`.
pub struct ContextAndInput<TIn>(PhantomData<fn() -> TIn>);

/// An async function adapted to [`Handler`].
pub struct HandlerFn<F, Shape, M> {
    f: F,
    codec: JsonCodec,
    rejected: Option<InvocationError>,
    _shape: PhantomData<fn() -> (Shape, M)>,
}

impl<F, Shape, M> HandlerFn<F, Shape, M> {
    fn new(f: F) -> Self {
        Self {
            f,
            codec: JsonCodec::default(),
            rejected: None,
            _shape: PhantomData,
        }
    }

    fn apply(&mut self, options: &HandlerOptions) {
        self.codec = options.codec().clone();
        self.rejected = self.codec.validate().err().map(InvocationError::from);
    }

    fn check(&self) -> Result<(), InvocationError> {
        match &self.rejected {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Adapt `async fn(Context, TIn) -> R`.
pub fn handler_fn<F, Fut, TIn, R, M>(f: F) -> HandlerFn<F, ContextAndInput<TIn>, M>
where
    F: Fn(Context, TIn) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    TIn: DeserializeOwned + Send + 'static,
    R: HandlerOutput<M>,
{
    HandlerFn::new(f)
}

/// Adapt `async fn(TIn) -> R`.
pub fn input_fn<F, Fut, TIn, R, M>(f: F) -> HandlerFn<F, InputOnly<TIn>, M>
where
    F: Fn(TIn) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    TIn: DeserializeOwned + Send + 'static,
    R: HandlerOutput<M>,
{
    HandlerFn::new(f)
}

/// Adapt `async fn(Context) -> R`. The payload is ignored.
pub fn context_fn<F, Fut, R, M>(f: F) -> HandlerFn<F, ContextOnly, M>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: HandlerOutput<M>,
{
    HandlerFn::new(f)
}

/// Adapt `async fn() -> R`. The payload is ignored.
pub fn unit_fn<F, Fut, R, M>(f: F) -> HandlerFn<F, NoArgs, M>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: HandlerOutput<M>,
{
    HandlerFn::new(f)
}

#[async_trait]
impl<F, Fut, TIn, R, M> Handler for HandlerFn<F, ContextAndInput<TIn>, M>
where
    F: Fn(Context, TIn) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    TIn: DeserializeOwned + Send + 'static,
    R: HandlerOutput<M>,
{
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError> {
        self.check()?;
        let input: TIn = self.codec.decode(&payload)?;
        HandlerTrace::request(&ctx, &input);
        (self.f)(ctx.clone(), input).await.into_result(&ctx, &self.codec)
    }

    fn configure(&mut self, options: &HandlerOptions) {
        self.apply(options);
    }
}

#[async_trait]
impl<F, Fut, TIn, R, M> Handler for HandlerFn<F, InputOnly<TIn>, M>
where
    F: Fn(TIn) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    TIn: DeserializeOwned + Send + 'static,
    R: HandlerOutput<M>,
{
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError> {
        self.check()?;
        let input: TIn = self.codec.decode(&payload)?;
        HandlerTrace::request(&ctx, &input);
        (self.f)(input).await.into_result(&ctx, &self.codec)
    }

    fn configure(&mut self, options: &HandlerOptions) {
        self.apply(options);
    }
}

#[async_trait]
impl<F, Fut, R, M> Handler for HandlerFn<F, ContextOnly, M>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: HandlerOutput<M>,
{
    async fn invoke(&self, ctx: Context, _payload: Bytes) -> Result<Response, InvocationError> {
        self.check()?;
        HandlerTrace::request(&ctx, &());
        (self.f)(ctx.clone()).await.into_result(&ctx, &self.codec)
    }

    fn configure(&mut self, options: &HandlerOptions) {
        self.apply(options);
    }
}

#[async_trait]
impl<F, Fut, R, M> Handler for HandlerFn<F, NoArgs, M>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: HandlerOutput<M>,
{
    async fn invoke(&self, ctx: Context, _payload: Bytes) -> Result<Response, InvocationError> {
        self.check()?;
        HandlerTrace::request(&ctx, &());
        (self.f)().await.into_result(&ctx, &self.codec)
    }

    fn configure(&mut self, options: &HandlerOptions) {
        self.apply(options);
    }
}
