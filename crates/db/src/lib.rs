use std::sync::Arc;

use peerbook_core::booking::orchestrator::BookingPorts;
use peerbook_core::booking::ports::IdentityProvider;

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryBookingStore, InMemoryConversationStore, InMemoryInteractionLog,
    InMemoryServiceCatalog, RepositoryError, SqlBookingStore, SqlConversationStore,
    SqlInteractionLog, SqlServiceCatalog,
};

/// SQLite-backed stores sharing one pool.
#[derive(Clone)]
pub struct SqlStores {
    pub services: Arc<SqlServiceCatalog>,
    pub bookings: Arc<SqlBookingStore>,
    pub conversations: Arc<SqlConversationStore>,
    pub interactions: Arc<SqlInteractionLog>,
}

impl SqlStores {
    pub fn new(pool: DbPool) -> Self {
        Self {
            services: Arc::new(SqlServiceCatalog::new(pool.clone())),
            bookings: Arc::new(SqlBookingStore::new(pool.clone())),
            conversations: Arc::new(SqlConversationStore::new(pool.clone())),
            interactions: Arc::new(SqlInteractionLog::new(pool)),
        }
    }

    pub fn ports(&self, identity: Arc<dyn IdentityProvider>) -> BookingPorts {
        BookingPorts {
            identity,
            bookings: self.bookings.clone(),
            conversations: self.conversations.clone(),
            messages: self.conversations.clone(),
            interactions: self.interactions.clone(),
        }
    }
}

/// Process-local stores for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub services: Arc<InMemoryServiceCatalog>,
    pub bookings: Arc<InMemoryBookingStore>,
    pub conversations: Arc<InMemoryConversationStore>,
    pub interactions: Arc<InMemoryInteractionLog>,
}

impl MemoryStores {
    pub fn ports(&self, identity: Arc<dyn IdentityProvider>) -> BookingPorts {
        BookingPorts {
            identity,
            bookings: self.bookings.clone(),
            conversations: self.conversations.clone(),
            messages: self.conversations.clone(),
            interactions: self.interactions.clone(),
        }
    }
}
