// uplink-api: Transport layer for the uplink device agent (mTLS, token exchange, upstream session)

pub mod backoff;
pub mod error;
pub mod tls;
pub mod token;
pub mod transport;
pub mod upstream;

pub use backoff::Backoff;
pub use error::Error;
pub use tls::{ClientTls, load_client_tls};
pub use token::{TokenClient, TokenRequest};
pub use transport::TransportConfig;
pub use upstream::{
    ClientConfig, ConnectError, PingConfig, PingMissHandler, QueueConfig, UpstreamClient,
    UpstreamConnector,
};
pub use upstream::websocket::{SessionState, WebSocketClient, WebSocketConnector};
