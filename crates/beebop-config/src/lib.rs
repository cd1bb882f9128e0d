pub mod beebop;
pub mod error;
pub mod record;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod tree;
pub mod vault;

pub use beebop::*;
pub use error::*;
pub use record::*;
pub use tree::ConfigTree;
pub use vault::{SecretRef, SecretStore, VaultCli, VaultSettings};

use std::path::{Path, PathBuf};

/// 既定の設定ディレクトリ
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// 設定ディレクトリを探す
///
/// 以下の優先順位で検索:
/// 1. 明示指定（`--config-path` または BEEBOP_CONFIG_PATH 環境変数）
/// 2. カレントディレクトリの `config/`
/// 3. ~/.config/beebop/ (グローバル設定)
pub fn find_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    // 1. 明示指定
    if let Some(path) = explicit {
        if path.join(BASE_FILE).exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ConfigDirNotFound(path.to_path_buf()));
    }

    // 2. カレントディレクトリ
    let local = std::env::current_dir()?.join(DEFAULT_CONFIG_DIR);
    if local.join(BASE_FILE).exists() {
        return Ok(local);
    }

    // 3. グローバル設定
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("beebop");
        if global.join(BASE_FILE).exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigDirNotFound(PathBuf::from(
        DEFAULT_CONFIG_DIR,
    )))
}
