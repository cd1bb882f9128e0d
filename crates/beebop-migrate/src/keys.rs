//! ジョブハッシュのキー移行（microreact → visualise）
//!
//! 旧キーはコピー後も削除しません。削除は [`cleanup_keys`] で別途行います。

use crate::error::Result;
use crate::store::HashStore;
use tracing::{info, warn};

pub const OLD_KEY: &str = "beebop:hash:job:microreact";
pub const NEW_KEY: &str = "beebop:hash:job:visualise";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyReport {
    /// (旧キー, 新キー)
    pub copied: Vec<(String, String)>,
    pub fields: usize,
}

/// 旧キー名を新しい名前空間に置き換える
pub fn renamed_key(key: &str) -> Option<String> {
    let rest = key.strip_prefix(OLD_KEY)?;
    if rest.is_empty() || rest.starts_with(':') {
        Some(format!("{}{}", NEW_KEY, rest))
    } else {
        None
    }
}

fn old_keys(store: &mut impl HashStore) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    if store.exists(OLD_KEY)? {
        keys.push(OLD_KEY.to_string());
    } else {
        info!(key = OLD_KEY, "Source key does not exist");
    }
    keys.extend(store.keys(&format!("{}:*", OLD_KEY))?);
    Ok(keys)
}

/// 旧名前空間の全ハッシュを新名前空間にコピー
pub fn migrate_keys(store: &mut impl HashStore) -> Result<KeyReport> {
    let mut report = KeyReport::default();

    for key in old_keys(store)? {
        let Some(target) = renamed_key(&key) else {
            warn!(key = %key, "Unexpected key name, skipping");
            continue;
        };
        let fields = store.get_all(&key)?;
        store.set_all(&target, &fields)?;
        info!(from = %key, to = %target, fields = fields.len(), "Copied hash");

        report.fields += fields.len();
        report.copied.push((key, target));
    }

    Ok(report)
}

/// 旧名前空間のキーを削除。削除したキーを返す
pub fn cleanup_keys(store: &mut impl HashStore) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for key in old_keys(store)? {
        if store.delete(&key)? {
            info!(key = %key, "Deleted key");
            deleted.push(key);
        }
    }
    Ok(deleted)
}
