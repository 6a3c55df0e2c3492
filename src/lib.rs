// Public modules
pub mod aggregator;
pub mod chat;
pub mod codec;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod http;
pub mod memory;
pub mod notify;
pub mod observability;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod utils;

// Re-exports
pub use aggregator::{Applied, StreamAggregator};
pub use codec::{decode_frame, encode_frame};
pub use connection::{
    ConnectAttempt, ConnectionConfig, ConnectionEvent, ConnectionEventKind, ConnectionEvents,
    ConnectionManager, ConnectionState,
};
pub use credentials::{CredentialProvider, EnvCredentials, StaticToken};
pub use error::{Error, Result};
pub use http::HttpSessionService;
pub use notify::{CollectingSink, ErrorSink, Severity, TracingSink};
pub use observability::register_biometrics;
pub use session::{SessionManager, SessionService};
pub use store::{ConversationStore, StoreConfig, StoreSnapshot, StoreUpdate};
pub use transport::{Connector, Outgoing, TransportEvent, TransportLink, WebSocketConnector};
pub use types::*;
