//! デプロイ記録
//!
//! 最後に `start` した設定名・時刻・設定スナップショットを
//! `<config>/.last_deploy` に保存し、後続のコマンドで再利用します。
//! 同時実行はロックファイルで防ぎます。

use crate::error::{ConfigError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const RECORD_FILE: &str = ".last_deploy";
const LOCK_FILE: &str = ".last_deploy.lock";

/// ロックが古いとみなすまでの時間
const STALE_LOCK_HOURS: i64 = 1;

/// 最後のデプロイ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// 名前付き設定（ベースのみの場合は None）
    pub config_name: Option<String>,
    pub time: DateTime<Utc>,
    /// マージ済み設定ツリー（Vault参照は未解決のまま）
    pub data: serde_yaml::Value,
}

impl DeploymentRecord {
    pub fn new(config_name: Option<String>, data: serde_yaml::Value) -> Self {
        Self {
            config_name,
            time: Utc::now(),
            data,
        }
    }

    /// 表示用の設定名
    pub fn display_name(&self) -> &str {
        self.config_name.as_deref().unwrap_or("<base>")
    }

    /// 記録からの経過時間（秒単位に丸める）
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        let seconds = now.signed_duration_since(self.time).num_seconds().max(0);
        std::time::Duration::from_secs(seconds as u64)
    }
}

/// デプロイ記録の読み書き
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// 記録を読み込む（なければ None）
    pub async fn load(&self) -> Result<Option<DeploymentRecord>> {
        let path = self.path();
        if !path.exists() {
            tracing::debug!("Deployment record not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let record: DeploymentRecord = serde_json::from_str(&content).map_err(|e| {
            ConfigError::Record(format!("{} を読み込めません: {}", path.display(), e))
        })?;
        tracing::debug!(name = record.display_name(), "Loaded deployment record");
        Ok(Some(record))
    }

    pub async fn save(&self, record: &DeploymentRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        fs::write(self.path(), content).await?;
        tracing::debug!(name = record.display_name(), "Saved deployment record");
        Ok(())
    }

    /// 記録を削除（削除した場合 true）
    pub async fn remove(&self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        tracing::debug!("Removed deployment record");
        Ok(true)
    }

    /// 排他ロックを取得
    ///
    /// ロックファイルは `create_new` で作成し、保持者は常に一つです。
    pub async fn acquire_lock(&self) -> Result<RecordLock> {
        let lock_path = self.lock_path();

        if lock_path.exists() {
            self.check_existing_lock(&lock_path).await?;
        }

        let info = LockInfo {
            holder: format!(
                "{}:{}",
                std::env::var("HOSTNAME")
                    .or_else(|_| std::env::var("HOST"))
                    .unwrap_or_else(|_| "unknown".to_string()),
                std::process::id()
            ),
            acquired_at: Utc::now(),
        };

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // 別のプロセスが先に作成した
                let holder = fs::read_to_string(&lock_path)
                    .await
                    .ok()
                    .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok());
                return Err(match holder {
                    Some(info) => ConfigError::Locked {
                        holder: info.holder,
                        since: info.acquired_at.to_rfc3339(),
                    },
                    None => ConfigError::Locked {
                        holder: "unknown".to_string(),
                        since: Utc::now().to_rfc3339(),
                    },
                });
            }
            Err(e) => return Err(e.into()),
        };
        let lock = RecordLock {
            lock_path,
            released: false,
        };
        file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
            .await?;
        file.flush().await?;

        tracing::debug!("Acquired deployment record lock");
        Ok(lock)
    }

    /// 既存のロックが有効ならエラー、古いか壊れていれば削除
    async fn check_existing_lock(&self, lock_path: &Path) -> Result<()> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // 読む前に解放された
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<LockInfo>(&content) {
            Ok(info) => {
                let age = Utc::now().signed_duration_since(info.acquired_at);
                if age.num_hours() < STALE_LOCK_HOURS {
                    return Err(ConfigError::Locked {
                        holder: info.holder,
                        since: info.acquired_at.to_rfc3339(),
                    });
                }
                tracing::warn!("Removing stale lock from {}", info.holder);
            }
            // 書き込み途中のロックは有効とみなす
            Err(_) if content.is_empty() => {
                return Err(ConfigError::Locked {
                    holder: "unknown".to_string(),
                    since: Utc::now().to_rfc3339(),
                });
            }
            Err(_) => tracing::warn!("Removing unreadable lock file"),
        }
        match fs::remove_file(lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// ロックのRAIIガード
pub struct RecordLock {
    lock_path: PathBuf,
    released: bool,
}

impl RecordLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released deployment record lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
