//! Connections and their serialized send path.

mod channel;
mod handle;
mod id;
mod raw;
mod websocket;
mod writer;

pub use channel::{ChannelConnection, ChannelPeer, PeerFrame};
pub use handle::ConnectionHandle;
pub use id::ConnectionId;
pub use raw::{ConnectionError, RawConnection};
pub use websocket::WebSocketSink;
pub use writer::{
    ConnectionWriter, OverflowPolicy, SendOutcome, WriterConfig, WriterError, WriterState,
};
