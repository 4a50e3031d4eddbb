pub mod validator;
pub mod websocket;

pub use validator::{normalize_websocket_url, WsUrlInfo, WsValidator};
pub use websocket::{
    check_websocket_endpoint, send_websocket_message, ResponseTransport, WebSocketTransport,
};
