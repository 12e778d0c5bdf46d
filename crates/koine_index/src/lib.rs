pub mod datastore;
pub mod db;
pub mod index;
pub mod migration;
pub mod platform;

pub use datastore::{default_sqlite_path, load_or_init_config, open_index};
pub use index::MembershipIndex;
pub use platform::DbPlatform;

pub use koine_core::{
    DatabaseConfig, IndexConfig, KoineError, KoineResult, MembershipReadApi, MembershipTriple,
    MembershipTxApi, MembershipWriteApi, PoolConfig, ResourceId, Timestamp,
};
