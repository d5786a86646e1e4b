//! Identifier types shared by the instance store and the saga core.

mod types;

pub use types::{CorrelationId, InvalidCorrelationId};
