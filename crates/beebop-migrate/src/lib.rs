//! beebop の出力データ移行ツール
//!
//! 可視化機能の名称変更（microreact → visualise）に伴い、
//! Redis のジョブハッシュと出力フォルダを新しい構成に移します。

pub mod error;
pub mod folders;
pub mod keys;
pub mod store;

pub use error::{MigrateError, Result};
pub use folders::{MigrationReport, cleanup_backups, migrate_folders};
pub use keys::{KeyReport, cleanup_keys, migrate_keys};
pub use store::{HashFields, HashStore, MemoryStore, RedisStore};

pub const DEFAULT_OUTPUT_DIR: &str = "poppunk_output";
pub const DEFAULT_REDIS_URL: &str = "redis://beebop-redis/";
