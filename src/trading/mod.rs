//! Trading logic: configuration, position sizing, retry policy.

mod config;
mod position_sizer;
mod retry;

pub use config::{MarketScope, ReplicationConfig};
pub use position_sizer::{size_position, SizingDecision, SizingReason};
pub use retry::RetryPolicy;
