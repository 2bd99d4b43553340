//! Broker façade — bundles the shared state every connection handler needs,
//! so `client_handler` and `controller_handler` depend on one shared struct
//! instead of holding references to each other (spec §9's redesign note
//! against cyclic handler references).

use std::sync::Arc;

use garden_core::config::GardenConfig;
use garden_core::pending::PendingTables;
use garden_core::persistence::PgPool;
use garden_core::registry::SessionRegistry;

pub struct Broker {
    pub config: Arc<GardenConfig>,
    pub db: PgPool,
    pub registry: SessionRegistry,
    pub pending: PendingTables,
}

impl Broker {
    pub fn new(config: Arc<GardenConfig>) -> Self {
        let db = PgPool::new(config.storage.postgres_dsn.clone().unwrap_or_default());
        let pending = PendingTables::new(&config.pending_deadlines);
        Self {
            config,
            db,
            registry: SessionRegistry::new(),
            pending,
        }
    }
}
