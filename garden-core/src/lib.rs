pub mod broadcaster;
pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod invite;
pub mod pending;
pub mod persistence;
pub mod protocol;
pub mod registry;

pub use broadcaster::GardenBroadcaster;
pub use channel::{ChannelHandle, ChannelId, CloseReason, OutgoingMessage};
pub use config::{load_config, GardenConfig};
pub use error::BrokerError;
pub use pending::{PendingContext, PendingTable, PendingTables};
pub use persistence::PgPool;
pub use registry::SessionRegistry;
