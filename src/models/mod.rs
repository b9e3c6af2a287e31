//! Data models for observed orders and replication records.

mod order;
mod record;

pub use order::{OrderRequest, OrderResult, OrderSide, RemoteOrder};
pub use record::{ReplicationOutcome, ReplicationRecord};
