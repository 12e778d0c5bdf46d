pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod time;
pub mod triple;

pub use api::*;
pub use config::{DatabaseConfig, IndexConfig, PoolConfig};
pub use error::{KoineError, KoineResult};
pub use ids::*;
pub use time::*;
pub use triple::*;
