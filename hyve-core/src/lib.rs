pub mod confirmation;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod registry;
pub mod sse;
pub mod store;

pub use confirmation::ConfirmationTracker;
pub use error::IndexerError;
pub use events::EventBus;
pub use ingestion::Poller;
pub use registry::AddressRegistry;
pub use store::{memory::MemoryStore, postgres::PgStore, Store, StoreError};
