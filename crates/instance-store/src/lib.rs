pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::CorrelationId;
pub use error::{InstanceStoreError, Result};
pub use memory::InMemoryInstanceStore;
pub use postgres::PostgresInstanceStore;
pub use query::InstanceQuery;
pub use record::{InstanceRecord, Version};
pub use store::{InstanceStore, InstanceStoreExt};
