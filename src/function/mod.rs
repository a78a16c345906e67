//! The function side: handlers, their context, and how their results and
//! failures are encoded.

pub mod codec;
pub mod context;
pub mod handler;
pub mod lambda_context;
pub(crate) mod panic;
pub mod trace;

pub use codec::JsonCodec;
pub use context::{CancelHandle, Context, ContextError};
pub use handler::{
    context_fn, handler_fn, input_fn, unit_fn, Handler, HandlerFn, HandlerOutput, IntoResponse,
};
pub use lambda_context::{
    function_config, ClientApplication, ClientContext, CognitoIdentity, FunctionConfig,
    LambdaContext, TraceId,
};
pub use trace::HandlerTrace;
