// uplink-core: Device identity, bootstrap sequencing, and upstream session supervision.

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod network;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Config, RawConfig};
pub use error::CoreError;
pub use identity::{DeviceId, MacAddress, is_valid_mac, validate};
pub use lifecycle::{Lifecycle, StopHook};
pub use network::{AddressFamily, NetworkGate, Reachability};
pub use supervisor::{
    BootstrapReport, SessionHandle, StageOutcome, StageStatus, Supervisor, SupervisorState,
};

// Transport types consumers need to drive a session.
pub use uplink_api::Error as ApiError;
pub use uplink_api::{UpstreamClient, UpstreamConnector, WebSocketClient, WebSocketConnector};
