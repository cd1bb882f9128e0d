//! Vault統合モジュール
//!
//! `VAULT:<path>:<field>` 形式の参照を Vault CLI を使って解決します。
//!
//! ## 設定
//!
//! ```yaml
//! vault:
//!   addr: https://vault.example.com:8200
//!   auth:
//!     method: github
//! ```
//!
//! ## 必要な環境
//!
//! - Vault CLI (`vault`) がインストールされていること
//! - `token` 認証: `auth.args.token` または `VAULT_TOKEN` 環境変数
//! - `github` 認証: `auth.args.token` または `VAULT_AUTH_GITHUB_TOKEN` 環境変数
//!
//! 解決された秘密情報はログに出力されません。

use crate::error::{ConfigError, Result};
use crate::tree::ConfigTree;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, info};

/// Vault参照のプレフィックス
const VAULT_PREFIX: &str = "VAULT:";

/// 値がVault参照かどうかをチェック
pub fn is_vault_reference(value: &str) -> bool {
    value.starts_with(VAULT_PREFIX)
}

/// Vault参照 (`VAULT:secret/beebop/oauth:client_id`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub path: String,
    pub field: String,
}

impl SecretRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || ConfigError::SecretUnavailable {
            reference: reference.to_string(),
            message: "VAULT:<path>:<field> 形式である必要があります".to_string(),
        };
        let body = reference.strip_prefix(VAULT_PREFIX).ok_or_else(invalid)?;
        let (path, field) = body.rsplit_once(':').ok_or_else(invalid)?;
        if path.is_empty() || field.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            path: path.to_string(),
            field: field.to_string(),
        })
    }
}

/// シークレットの取得元
pub trait SecretStore {
    fn read(&self, secret: &SecretRef) -> Result<String>;
}

/// `vault` セクション
#[derive(Debug, Clone, Deserialize)]
pub struct VaultSettings {
    pub addr: String,
    #[serde(default)]
    pub auth: VaultAuth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultAuth {
    #[serde(default = "default_auth_method")]
    pub method: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl Default for VaultAuth {
    fn default() -> Self {
        Self {
            method: default_auth_method(),
            args: BTreeMap::new(),
        }
    }
}

fn default_auth_method() -> String {
    "token".to_string()
}

impl VaultSettings {
    /// 設定ツリーから `vault` セクションを取り出す
    pub fn from_tree(tree: &ConfigTree) -> Result<Option<Self>> {
        let Some(value) = tree.get(&["vault"]) else {
            return Ok(None);
        };
        if !tree.contains(&["vault", "addr"]) {
            return Ok(None);
        }
        serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|_| ConfigError::TypeMismatch {
                path: "vault".to_string(),
                expected: "mapping with addr and auth",
            })
    }
}

/// Vault CLI によるシークレット取得
pub struct VaultCli {
    settings: VaultSettings,
    token: RefCell<Option<String>>,
}

impl VaultCli {
    pub fn new(settings: VaultSettings) -> Self {
        Self {
            settings,
            token: RefCell::new(None),
        }
    }

    fn unavailable(secret: &SecretRef, message: impl Into<String>) -> ConfigError {
        ConfigError::SecretUnavailable {
            reference: format!("{}{}:{}", VAULT_PREFIX, secret.path, secret.field),
            message: message.into(),
        }
    }

    fn token(&self, secret: &SecretRef) -> Result<String> {
        if let Some(token) = self.token.borrow().as_ref() {
            return Ok(token.clone());
        }

        let auth = &self.settings.auth;
        let token = match auth.method.as_str() {
            "token" => auth
                .args
                .get("token")
                .cloned()
                .or_else(|| std::env::var("VAULT_TOKEN").ok())
                .ok_or_else(|| {
                    Self::unavailable(
                        secret,
                        "Vaultトークンがありません\nヒント: VAULT_TOKEN を設定してください",
                    )
                })?,
            "github" => {
                let github_token = auth
                    .args
                    .get("token")
                    .cloned()
                    .or_else(|| std::env::var("VAULT_AUTH_GITHUB_TOKEN").ok())
                    .ok_or_else(|| {
                        Self::unavailable(
                            secret,
                            "GitHubトークンがありません\nヒント: VAULT_AUTH_GITHUB_TOKEN を設定してください",
                        )
                    })?;
                self.login_github(secret, &github_token)?
            }
            other => {
                return Err(Self::unavailable(
                    secret,
                    format!("未対応の認証方式です: {}", other),
                ));
            }
        };

        *self.token.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    fn login_github(&self, secret: &SecretRef, github_token: &str) -> Result<String> {
        debug!(addr = %self.settings.addr, "Logging in to vault with github");
        let output = Command::new("vault")
            .args(["login", "-token-only", "-method=github"])
            .arg(format!("token={}", github_token))
            .env("VAULT_ADDR", &self.settings.addr)
            .output()
            .map_err(|e| Self::unavailable(secret, format!("Vault CLI実行エラー: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::unavailable(
                secret,
                format!("Vaultログインに失敗: {}", stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl SecretStore for VaultCli {
    fn read(&self, secret: &SecretRef) -> Result<String> {
        let token = self.token(secret)?;
        debug!(path = %secret.path, field = %secret.field, "Resolving vault reference");

        let output = Command::new("vault")
            .arg("read")
            .arg(format!("-field={}", secret.field))
            .arg(&secret.path)
            .env("VAULT_ADDR", &self.settings.addr)
            .env("VAULT_TOKEN", token)
            .output()
            .map_err(|e| {
                Self::unavailable(
                    secret,
                    format!(
                        "Vault CLI実行エラー: {}\nヒント: vault がインストールされているか確認してください",
                        e
                    ),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let hint = if stderr.contains("connection refused") || stderr.contains("no such host")
            {
                "\nヒント: vault.addr に到達できるか確認してください"
            } else if stderr.contains("No value found") || stderr.contains("not present") {
                "\nヒント: パスとフィールド名が正しいか確認してください"
            } else {
                ""
            };
            return Err(Self::unavailable(
                secret,
                format!("{}{}", stderr.trim(), hint),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// ツリー内のVault参照をすべて解決
///
/// 解決した参照の数を返します。参照がなければ `store` は呼ばれません。
pub fn resolve_secrets(tree: &mut ConfigTree, store: &dyn SecretStore) -> Result<usize> {
    let count = tree.rewrite_strings(|value| {
        if !is_vault_reference(value) {
            return Ok(None);
        }
        let secret = SecretRef::parse(value)?;
        store.read(&secret).map(Some)
    })?;

    if count > 0 {
        info!(resolved = count, "Resolved vault references");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapStore(BTreeMap<(String, String), String>);

    impl SecretStore for MapStore {
        fn read(&self, secret: &SecretRef) -> Result<String> {
            self.0
                .get(&(secret.path.clone(), secret.field.clone()))
                .cloned()
                .ok_or_else(|| ConfigError::SecretUnavailable {
                    reference: secret.path.clone(),
                    message: "missing".to_string(),
                })
        }
    }

    #[test]
    fn test_is_vault_reference() {
        assert!(is_vault_reference("VAULT:secret/beebop/oauth:client_id"));
        assert!(!is_vault_reference("vault:lowercase"));
        assert!(!is_vault_reference("plain"));
    }

    #[test]
    fn test_parse_reference() {
        let secret = SecretRef::parse("VAULT:secret/beebop/auth/google:client_id").unwrap();
        assert_eq!(secret.path, "secret/beebop/auth/google");
        assert_eq!(secret.field, "client_id");
    }

    #[test]
    fn test_parse_reference_invalid() {
        assert!(SecretRef::parse("VAULT:no-field").is_err());
        assert!(SecretRef::parse("VAULT::field").is_err());
        assert!(SecretRef::parse("not-a-reference").is_err());
    }

    #[test]
    fn test_resolve_secrets() {
        let mut tree = ConfigTree::parse(
            "server:\n  auth:\n    session_secret: VAULT:secret/beebop:session\n    plain: x\n",
        )
        .unwrap();
        let mut map = BTreeMap::new();
        map.insert(
            ("secret/beebop".to_string(), "session".to_string()),
            "s3cret".to_string(),
        );

        let count = resolve_secrets(&mut tree, &MapStore(map)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            tree.string(&["server", "auth", "session_secret"]).unwrap(),
            "s3cret"
        );
        assert_eq!(tree.string(&["server", "auth", "plain"]).unwrap(), "x");
    }

    #[test]
    fn test_resolve_secrets_missing_key() {
        let mut tree = ConfigTree::parse("a: VAULT:secret/beebop:missing\n").unwrap();
        let result = resolve_secrets(&mut tree, &MapStore(BTreeMap::new()));
        assert!(matches!(
            result,
            Err(ConfigError::SecretUnavailable { .. })
        ));
    }

    #[test]
    fn test_vault_settings_from_tree() {
        let tree = ConfigTree::parse(
            "vault:\n  addr: https://vault.dide.ic.ac.uk:8200\n  auth:\n    method: github\n",
        )
        .unwrap();
        let settings = VaultSettings::from_tree(&tree).unwrap().unwrap();
        assert_eq!(settings.addr, "https://vault.dide.ic.ac.uk:8200");
        assert_eq!(settings.auth.method, "github");

        let empty = ConfigTree::parse("vault:\n  addr: ~\n").unwrap();
        assert!(VaultSettings::from_tree(&empty).unwrap().is_none());
    }
}
