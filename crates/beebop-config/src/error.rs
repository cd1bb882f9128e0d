use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error(
        "設定 '{name}' が見つかりません: {path}\n\nヒント:\n  • 設定ディレクトリに {name}.yml があるか確認してください"
    )]
    UnknownName { name: String, path: PathBuf },

    #[error("必須フィールド '{path}' がありません")]
    MissingField { path: String },

    #[error("フィールド '{path}' の型が不正です（期待: {expected}）")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("シークレット '{reference}' を解決できません: {message}")]
    SecretUnavailable { reference: String, message: String },

    #[error("不正なオプション '{0}'（key=value 形式で指定してください）")]
    InvalidOption(String),

    #[error("YAMLパースエラー: {path}\n理由: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("デプロイ記録エラー: {0}")]
    Record(String),

    #[error("デプロイ記録はロックされています（{holder}, {since}）")]
    Locked { holder: String, since: String },

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
