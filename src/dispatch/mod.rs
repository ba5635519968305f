//! Inbound frame routing.

mod dispatcher;
mod handlers;

pub use dispatcher::{
    DispatchOutcome, FrameHandler, InboundContext, InboundDispatcher, TextHandler, Unroutable,
};
pub use handlers::{
    build_dispatcher, ErrorReplyFallback, PingFrame, PingHandler, RelayFrame, RelayHandler,
};
