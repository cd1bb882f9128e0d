use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error(
        "Redisに接続できません: {0}\n\nヒント:\n  • --redis-url を確認してください\n  • beebop のスタックが起動しているか確認してください"
    )]
    RedisConnection(String),

    #[error("Redisエラー: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("出力ディレクトリが見つかりません: {0}")]
    OutputDirNotFound(PathBuf),

    #[error("ファイル操作に失敗しました: {path}\n理由: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ディレクトリの走査に失敗しました: {0}")]
    Walk(#[from] walkdir::Error),
}

impl MigrateError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
