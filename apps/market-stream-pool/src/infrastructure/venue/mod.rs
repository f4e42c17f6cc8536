//! Venue WebSocket Integration
//!
//! Client-side implementation of the venue streaming protocol: wire
//! messages, the frame codec, authentication, reconnection backoff, the
//! WebSocket transport and the streaming connection built from them.

pub mod auth;
pub mod codec;
pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use auth::{AuthError, AuthHandler, AuthState, Credentials};
pub use codec::{CodecError, FrameCodec};
pub use connection::{ConnectError, ConnectionStats, StreamConnection, StreamConnectionConfig};
pub use messages::{ControlRequest, FrameKind, StatusKind, StreamChannel, VenueMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::WebSocketConnector;
