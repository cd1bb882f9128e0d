//! Redis ハッシュへのアクセス
//!
//! 移行処理は [`HashStore`] だけを通して Redis を読み書きします。
//! 本番は [`RedisStore`]、テストは [`MemoryStore`] を使います。

use crate::error::{MigrateError, Result};
use redis::Commands;
use std::collections::BTreeMap;
use tracing::debug;

/// フィールド名 → 値
pub type HashFields = BTreeMap<String, Vec<u8>>;

pub trait HashStore {
    fn exists(&mut self, key: &str) -> Result<bool>;

    /// `pattern` に一致するキー（末尾の `*` のみ対応すればよい）
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>>;

    fn get_all(&mut self, key: &str) -> Result<HashFields>;

    /// フィールドを上書き（既存の他フィールドは残す）
    fn set_all(&mut self, key: &str, fields: &HashFields) -> Result<()>;

    /// キーを削除。存在した場合 true
    fn delete(&mut self, key: &str) -> Result<bool>;
}

pub struct RedisStore {
    connection: redis::Connection,
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| MigrateError::RedisConnection(e.to_string()))?;
        let connection = client
            .get_connection()
            .map_err(|e| MigrateError::RedisConnection(e.to_string()))?;
        debug!(url, "Connected to Redis");
        Ok(Self { connection })
    }
}

impl HashStore for RedisStore {
    fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.connection.exists(key)?)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.connection.keys(pattern)?;
        keys.sort();
        Ok(keys)
    }

    fn get_all(&mut self, key: &str) -> Result<HashFields> {
        Ok(self.connection.hgetall(key)?)
    }

    fn set_all(&mut self, key: &str, fields: &HashFields) -> Result<()> {
        // 空の HSET は Redis がエラーにする
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &[u8])> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_slice()))
            .collect();
        self.connection.hset_multiple::<_, _, _, ()>(key, &items)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let removed: i64 = self.connection.del(key)?;
        Ok(removed > 0)
    }
}

/// インメモリ実装
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub hashes: BTreeMap<String, HashFields>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, F, V>(&mut self, key: &str, fields: I)
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<Vec<u8>>,
    {
        let entry = self.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.into(), value.into());
        }
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl HashStore for MemoryStore {
    fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.hashes.contains_key(key))
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .hashes
            .keys()
            .filter(|key| matches_pattern(pattern, key))
            .cloned()
            .collect())
    }

    fn get_all(&mut self, key: &str) -> Result<HashFields> {
        Ok(self.hashes.get(key).cloned().unwrap_or_default())
    }

    fn set_all(&mut self, key: &str, fields: &HashFields) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let entry = self.hashes.entry(key.to_string()).or_default();
        entry.extend(fields.iter().map(|(f, v)| (f.clone(), v.clone())));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.hashes.remove(key).is_some())
    }
}
