//! 起動後フック
//!
//! コンテナの作成・起動直後、次のサービスに進む前に一度だけ実行される処理。
//! ここでは「何をするか」だけを表し、実行は `beebop-container` が担います。

use serde::{Deserialize, Serialize};

/// ストレージボリュームのマウント先
pub const STORAGE_MOUNT: &str = "/beebop/storage";

/// サーバー設定の書き込み先
pub const SERVER_CONFIG_PATH: &str = "/app/src/resources/config.json";

/// プロキシの証明書ディレクトリ
pub const PROXY_CERT_DIR: &str = "/run/proxy";

const SELF_SIGNED_SCRIPT: &str = "/usr/local/bin/build-self-signed-certificate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hook {
    /// `redis-cli ping` が PONG を返すまで待つ
    WaitForRedis,
    /// API イメージの使い捨てコンテナでデータベースをダウンロード
    DownloadDatabases { references_only: bool },
    /// サーバー設定 JSON をコンテナに書き込む
    WriteServerConfig { document: serde_json::Value },
    /// 明示された証明書と鍵を配置
    InstallCertificates { certificate: String, key: String },
    /// 自己署名証明書を生成
    GenerateSelfSigned { host: String },
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WaitForRedis => "wait-for-redis",
            Self::DownloadDatabases { .. } => "download-databases",
            Self::WriteServerConfig { .. } => "write-server-config",
            Self::InstallCertificates { .. } => "install-certificates",
            Self::GenerateSelfSigned { .. } => "generate-self-signed",
        }
    }
}

pub fn redis_ping_command() -> Vec<String> {
    vec!["redis-cli".to_string(), "ping".to_string()]
}

/// データベースのダウンロードコマンド
pub fn download_databases_command(references_only: bool) -> Vec<String> {
    let mode = if references_only { "--refs" } else { "--small" };
    ["./scripts/download_db", mode, "storage"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn self_signed_command(host: &str) -> Vec<String> {
    [
        SELF_SIGNED_SCRIPT,
        PROXY_CERT_DIR,
        "GB",
        "London",
        "IC",
        "bacpop",
        host,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// 証明書・鍵の配置先 (certificate, key)
pub fn certificate_paths() -> (String, String) {
    (
        format!("{}/certificate.pem", PROXY_CERT_DIR),
        format!("{}/key.pem", PROXY_CERT_DIR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_command_modes() {
        assert_eq!(
            download_databases_command(false),
            vec!["./scripts/download_db", "--small", "storage"]
        );
        assert_eq!(
            download_databases_command(true),
            vec!["./scripts/download_db", "--refs", "storage"]
        );
    }

    #[test]
    fn test_self_signed_command() {
        let cmd = self_signed_command("beebop.dide.ic.ac.uk");
        assert_eq!(cmd[0], "/usr/local/bin/build-self-signed-certificate");
        assert_eq!(cmd[1], "/run/proxy");
        assert_eq!(cmd.last().map(String::as_str), Some("beebop.dide.ic.ac.uk"));
        assert_eq!(cmd.len(), 7);
    }

    #[test]
    fn test_certificate_paths() {
        let (cert, key) = certificate_paths();
        assert_eq!(cert, "/run/proxy/certificate.pem");
        assert_eq!(key, "/run/proxy/key.pem");
    }
}
