use std::path::{Path, PathBuf};

use koine_core::{IndexConfig, KoineResult};

use crate::MembershipIndex;

const DEFAULT_DB_NAME: &str = "koine.sqlite";

pub fn load_or_init_config(base: &Path) -> KoineResult<IndexConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    IndexConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_index(base: &Path) -> KoineResult<MembershipIndex> {
    let config = load_or_init_config(base)?;
    MembershipIndex::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
