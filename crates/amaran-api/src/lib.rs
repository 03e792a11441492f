// amaran-api: Async Rust client for the Amaran Desktop WebSocket protocol

pub mod codec;
pub mod correlator;
pub mod error;
pub mod token;
pub mod websocket;

pub use codec::{EncodingPolicy, Inbound, InboundFrame, PushEvent, Request, Response, WireMessage};
pub use error::Error;
pub use websocket::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState, Negotiated};
