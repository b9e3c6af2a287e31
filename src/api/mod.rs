//! Polymarket and Polygon API clients.

mod clob_client;
mod data_client;
mod polygon;
mod types;

pub use clob_client::{ClobClient, OrderResponse, PlacedOrder};
pub use data_client::{to_remote_order, DataClient};
pub use polygon::{parse_address, PolygonClient, POLYGON_RPC_URL};
pub use types::*;
