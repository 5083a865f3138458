//! Client-facing transport: the WebSocket gateway.

pub mod websocket;

pub use websocket::{GatewaySettings, WebSocketGateway};
