//! 型付き設定
//!
//! 読み込み順序: `beebop.yml` → `<name>.yml` → 明示オプション → Vault解決

use crate::error::{ConfigError, Result};
use crate::tree::ConfigTree;
use crate::vault::{SecretStore, VaultCli, VaultSettings, is_vault_reference, resolve_secrets};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// ベース設定ファイル名
pub const BASE_FILE: &str = "beebop.yml";

/// イメージ指定 (repo/name:tag)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub repo: String,
    pub name: String,
    pub tag: String,
}

impl ImageSettings {
    fn read(tree: &ConfigTree, section: &str) -> Result<Self> {
        Ok(Self {
            repo: tree.string(&[section, "image", "repo"])?,
            name: tree.string(&[section, "image", "name"])?,
            tag: tree.string(&[section, "image", "tag"])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    pub image: ImageSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub image: ImageSettings,
    pub storage_location: String,
    pub db_location: String,
    /// 参照データベースのみをダウンロードする
    pub references_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    pub google: OAuthClient,
    pub github: OAuthClient,
    pub session_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub image: ImageSettings,
    pub port: u16,
    pub client_url: String,
    pub server_url: String,
    pub auth: AuthSettings,
}

/// 明示的に与えられたTLS証明書と鍵
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub certificate: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub image: ImageSettings,
    pub host: String,
    pub port_http: u16,
    pub port_https: u16,
    pub ssl: Option<TlsMaterial>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub count: u32,
}

/// デプロイ設定
#[derive(Debug, Clone, PartialEq)]
pub struct BeebopConfig {
    /// 設定ディレクトリ
    pub path: PathBuf,
    /// 適用された名前付きオーバーライド（なければベースのみ）
    pub name: Option<String>,
    pub network: String,
    pub container_prefix: String,
    pub redis: RedisSettings,
    pub api: ApiSettings,
    pub server: ServerSettings,
    pub proxy: ProxySettings,
    pub worker: WorkerSettings,
    /// マージ後・Vault解決前のツリー（デプロイ記録用）
    pub snapshot: ConfigTree,
}

impl BeebopConfig {
    /// 解決済みツリーから型付き設定を構築
    pub fn from_tree(
        path: &Path,
        name: Option<&str>,
        tree: &ConfigTree,
        snapshot: ConfigTree,
    ) -> Result<Self> {
        let redis = RedisSettings {
            image: ImageSettings {
                repo: tree
                    .optional_string(&["redis", "image", "repo"])?
                    .unwrap_or_else(|| "library".to_string()),
                name: tree.string(&["redis", "image", "name"])?,
                tag: tree.string(&["redis", "image", "tag"])?,
            },
        };

        let api = ApiSettings {
            image: ImageSettings::read(tree, "api")?,
            storage_location: tree.string(&["api", "storage_location"])?,
            db_location: tree.string(&["api", "db_location"])?,
            references_only: tree
                .optional_boolean(&["api", "references_only"])?
                .unwrap_or(false),
        };

        let oauth = |provider: &str| -> Result<OAuthClient> {
            Ok(OAuthClient {
                client_id: tree.string(&["server", "auth", provider, "client_id"])?,
                secret: tree.string(&["server", "auth", provider, "secret"])?,
            })
        };

        let server = ServerSettings {
            image: ImageSettings::read(tree, "server")?,
            port: tree.port(&["server", "port"])?,
            client_url: tree.string(&["server", "client_url"])?,
            server_url: tree.string(&["server", "server_url"])?,
            auth: AuthSettings {
                google: oauth("google")?,
                github: oauth("github")?,
                session_secret: tree.string(&["server", "auth", "session_secret"])?,
            },
        };

        let ssl = if tree.contains(&["proxy", "ssl"]) {
            Some(TlsMaterial {
                certificate: tree.string(&["proxy", "ssl", "certificate"])?,
                key: tree.string(&["proxy", "ssl", "key"])?,
            })
        } else {
            None
        };

        let proxy = ProxySettings {
            image: ImageSettings::read(tree, "proxy")?,
            host: tree.string(&["proxy", "host"])?,
            port_http: tree.port(&["proxy", "port_http"])?,
            port_https: tree.port(&["proxy", "port_https"])?,
            ssl,
        };

        let worker = WorkerSettings {
            count: tree.count(&["worker", "count"])?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            name: name.map(str::to_string),
            network: tree.string(&["docker", "network"])?,
            container_prefix: tree.string(&["docker", "prefix"])?,
            redis,
            api,
            server,
            proxy,
            worker,
            snapshot,
        })
    }

    /// TLS証明書が明示されているか
    pub fn has_ssl(&self) -> bool {
        self.proxy.ssl.is_some()
    }
}

/// ベース・名前付きオーバーライド・オプションをマージしたツリーを読み込む
#[instrument(skip(path, options), fields(path = %path.display()))]
pub fn read_merged(
    path: &Path,
    name: Option<&str>,
    options: &BTreeMap<String, serde_yaml::Value>,
) -> Result<ConfigTree> {
    let base_path = path.join(BASE_FILE);
    if !base_path.exists() {
        return Err(ConfigError::ConfigDirNotFound(path.to_path_buf()));
    }
    let mut tree = ConfigTree::read(&base_path)?;
    debug!(file = %base_path.display(), "Read base configuration");

    if let Some(name) = name {
        let override_path = path.join(format!("{}.yml", name));
        if !override_path.exists() {
            return Err(ConfigError::UnknownName {
                name: name.to_string(),
                path: override_path,
            });
        }
        tree.merge(ConfigTree::read(&override_path)?);
        debug!(file = %override_path.display(), "Merged named configuration");
    }

    for (key, value) in options {
        tree.set(key, value.clone())?;
    }

    Ok(tree)
}

/// 設定を読み込む（Vault参照は `vault` セクションの設定で解決）
pub fn load(
    path: &Path,
    name: Option<&str>,
    options: &BTreeMap<String, serde_yaml::Value>,
) -> Result<BeebopConfig> {
    let tree = read_merged(path, name, options)?;
    let has_references = !tree.find_strings(is_vault_reference).is_empty();

    if !has_references {
        return finish(path, name, tree);
    }

    let Some(settings) = VaultSettings::from_tree(&tree)? else {
        let reference = tree
            .find_strings(is_vault_reference)
            .into_iter()
            .next()
            .unwrap_or_default();
        return Err(ConfigError::SecretUnavailable {
            reference,
            message: "vault セクションが設定されていません".to_string(),
        });
    };
    let store = VaultCli::new(settings);
    load_with_tree(path, name, tree, &store)
}

/// 任意のシークレットストアで設定を読み込む
pub fn load_with_secrets(
    path: &Path,
    name: Option<&str>,
    options: &BTreeMap<String, serde_yaml::Value>,
    store: &dyn SecretStore,
) -> Result<BeebopConfig> {
    let tree = read_merged(path, name, options)?;
    load_with_tree(path, name, tree, store)
}

fn load_with_tree(
    path: &Path,
    name: Option<&str>,
    tree: ConfigTree,
    store: &dyn SecretStore,
) -> Result<BeebopConfig> {
    let snapshot = tree.clone();
    let mut resolved = tree;
    resolve_secrets(&mut resolved, store)?;
    let config = BeebopConfig::from_tree(path, name, &resolved, snapshot)?;
    log_loaded(&config);
    Ok(config)
}

fn finish(path: &Path, name: Option<&str>, tree: ConfigTree) -> Result<BeebopConfig> {
    let config = BeebopConfig::from_tree(path, name, &tree, tree.clone())?;
    log_loaded(&config);
    Ok(config)
}

fn log_loaded(config: &BeebopConfig) {
    info!(
        name = config.name.as_deref().unwrap_or("<base>"),
        prefix = %config.container_prefix,
        workers = config.worker.count,
        ssl = config.has_ssl(),
        "Configuration loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::SecretRef;
    use std::fs;

    use crate::testing::SAMPLE_CONFIG as BASE;

    fn write_config(dir: &Path) {
        fs::write(dir.join(BASE_FILE), BASE).unwrap();
    }

    struct FixedStore;

    impl SecretStore for FixedStore {
        fn read(&self, secret: &SecretRef) -> Result<String> {
            Ok(format!("resolved-{}", secret.field))
        }
    }

    #[test]
    fn test_load_base() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let config = load(dir.path(), None, &BTreeMap::new()).unwrap();
        assert_eq!(config.name, None);
        assert_eq!(config.network, "beebop_nw");
        assert_eq!(config.container_prefix, "beebop");
        assert_eq!(config.redis.image.repo, "library");
        assert_eq!(config.redis.image.tag, "5.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.worker.count, 2);
        assert!(!config.has_ssl());
        assert!(!config.api.references_only);
    }

    #[test]
    fn test_load_named_override() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        fs::write(
            dir.path().join("production.yml"),
            "proxy:\n  host: beebop.dide.ic.ac.uk\n  ssl:\n    certificate: CERT\n    key: KEY\nworker:\n  count: 8\n",
        )
        .unwrap();

        let config = load(dir.path(), Some("production"), &BTreeMap::new()).unwrap();
        assert_eq!(config.name.as_deref(), Some("production"));
        assert_eq!(config.proxy.host, "beebop.dide.ic.ac.uk");
        assert_eq!(config.proxy.port_http, 80);
        assert_eq!(config.worker.count, 8);
        let ssl = config.proxy.ssl.unwrap();
        assert_eq!(ssl.certificate, "CERT");
        assert_eq!(ssl.key, "KEY");
    }

    #[test]
    fn test_load_unknown_name() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let err = load(dir.path(), Some("staging"), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownName { ref name, .. } if name == "staging"));
    }

    #[test]
    fn test_options_applied_last() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        fs::write(dir.path().join("fake.yml"), "worker:\n  count: 4\n").unwrap();

        let mut options = BTreeMap::new();
        options.insert("worker.count".to_string(), serde_yaml::Value::from(6));
        let config = load(dir.path(), Some("fake"), &options).unwrap();
        assert_eq!(config.worker.count, 6);
    }

    #[test]
    fn test_missing_required_field() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(BASE_FILE),
            BASE.replace("    session_secret: session\n", ""),
        )
        .unwrap();

        let err = load(dir.path(), None, &BTreeMap::new()).unwrap_err();
        match err {
            ConfigError::MissingField { path } => {
                assert_eq!(path, "server.auth.session_secret")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ssl_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        fs::write(
            dir.path().join("broken.yml"),
            "proxy:\n  ssl:\n    certificate: CERT\n",
        )
        .unwrap();

        let err = load(dir.path(), Some("broken"), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref path } if path == "proxy.ssl.key"));
    }

    #[test]
    fn test_vault_reference_without_vault_section() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        fs::write(
            dir.path().join("secret.yml"),
            "server:\n  auth:\n    session_secret: VAULT:secret/beebop:session\n",
        )
        .unwrap();

        let err = load(dir.path(), Some("secret"), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::SecretUnavailable { .. }));
    }

    #[test]
    fn test_load_with_secrets_keeps_snapshot_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        fs::write(
            dir.path().join("secret.yml"),
            "server:\n  auth:\n    session_secret: VAULT:secret/beebop:session\n",
        )
        .unwrap();

        let config =
            load_with_secrets(dir.path(), Some("secret"), &BTreeMap::new(), &FixedStore).unwrap();
        assert_eq!(config.server.auth.session_secret, "resolved-session");
        assert_eq!(
            config
                .snapshot
                .string(&["server", "auth", "session_secret"])
                .unwrap(),
            "VAULT:secret/beebop:session"
        );
    }

    #[test]
    fn test_missing_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), None, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigDirNotFound(_)));
    }
}
