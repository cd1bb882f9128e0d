use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error(
        "デプロイは既に起動しています: {}\n\nヒント:\n  • 先に beebop stop を実行してください\n  • 新しいイメージで再起動するには beebop upgrade を使用してください",
        .containers.join(", ")
    )]
    StackAlreadyRunning { containers: Vec<String> },

    #[error(
        "イメージ '{image}' が見つかりません\n\nヒント:\n  • イメージ名とタグを確認してください\n  • docker pull {image} でイメージをダウンロードしてください"
    )]
    ImageNotFound { image: String },

    #[error(
        "ポートが既に使用されています: {0}\n\nヒント:\n  • 既存のコンテナを停止してください\n  • proxy.port_http / proxy.port_https を変更してください"
    )]
    PortAlreadyInUse(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("デプロイ計画エラー: {0}")]
    Plan(#[from] beebop_core::CoreError),

    #[error("ファイルのアーカイブ作成に失敗: {0}")]
    Archive(#[from] std::io::Error),

    #[error("サービス '{service}' の設定フックが失敗しました: {source}")]
    Hook {
        service: String,
        #[source]
        source: Box<HookError>,
    },
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404 | 409,
                ..
            } => {
                // 404/409 は呼び出し側で処理される
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else if err_str.contains("port is already allocated") {
                    ContainerError::PortAlreadyInUse(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

/// 起動後フックのエラー
#[derive(Error, Debug)]
pub enum HookError {
    #[error(
        "コンテナ '{container}' の準備完了を待機中にタイムアウトしました（{attempts}回試行）\n\nヒント:\n  • docker logs {container} でログを確認してください"
    )]
    Timeout { container: String, attempts: u32 },

    #[error("データベースのダウンロードに失敗しました（終了コード {exit_code}）\n{output}")]
    DownloadFailed { exit_code: i64, output: String },

    #[error(
        "コンテナ '{container}' でのコマンド実行に失敗しました（終了コード {exit_code}）: {command}\n{output}"
    )]
    CommandFailed {
        container: String,
        command: String,
        exit_code: i64,
        output: String,
    },

    #[error("設定のシリアライズに失敗: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Runtime(#[from] ContainerError),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
