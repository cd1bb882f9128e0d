use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("サービスが見つかりません: {0}")]
    ServiceNotFound(String),

    #[error("サービス '{service}' がプール '{target}' を参照しています\nヒント: 環境変数で参照できるのは単一コンテナのサービスだけです")]
    PoolReference { service: String, target: String },

    #[error("ボリュームが見つかりません: {0}")]
    VolumeNotFound(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
