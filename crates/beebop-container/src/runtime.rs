use crate::error::Result;
use beebop_core::PortMapping;
use std::collections::BTreeMap;

/// コンテナランタイムのトレイト
///
/// ライフサイクル操作はすべてこのトレイトを通して行われます。
/// 実装は Docker ([`crate::DockerRuntime`]) とテスト用のインメモリ実装です。
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// ネットワークを作成（既にあれば何もしない）
    async fn ensure_network(&self, name: &str) -> Result<()>;
    /// ネットワークを削除（なければ何もしない）
    async fn remove_network(&self, name: &str) -> Result<()>;
    async fn ensure_volume(&self, name: &str) -> Result<()>;
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// イメージを取得。`always` が false ならローカルにない場合のみ
    async fn pull_image(&self, image: &str, always: bool) -> Result<()>;

    async fn create(&self, spec: &ContainerSpec) -> Result<()>;
    async fn start(&self, name: &str) -> Result<()>;
    /// 停止（`kill` なら SIGKILL）
    async fn stop(&self, name: &str, kill: bool) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
    async fn exists(&self, name: &str) -> Result<bool>;

    /// `beebop.project` ラベルが一致するコンテナ一覧
    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>>;

    /// 起動中のコンテナでコマンドを実行
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput>;
    /// コンテナ内のパスにファイルを書き込む
    async fn put_file(&self, name: &str, path: &str, content: &[u8]) -> Result<()>;
    /// 使い捨てコンテナを実行し、終了後に削除
    async fn run_once(&self, spec: &ContainerSpec) -> Result<ExecOutput>;
}

/// コンテナ作成パラメータ
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub environment: BTreeMap<String, String>,
    /// (ボリューム名, マウント先)
    pub mounts: Vec<(String, String)>,
    pub ports: Vec<PortMapping>,
    pub args: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// コマンドの実行結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// コンテナのステータス
#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub name: String,
    /// `beebop.service` ラベル
    pub service: Option<String>,
    pub state: ContainerState,
    pub image: String,
}

/// コンテナの状態
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    NotFound,
    Unknown,
}

impl ContainerState {
    /// Docker の status 文字列 ("Up 2 hours", "Exited (0) ...") から判定
    pub fn from_docker_status(status: &str) -> Self {
        if status.contains("(Paused)") {
            Self::Paused
        } else if status.starts_with("Up") {
            Self::Running
        } else if status.starts_with("Exited") || status.starts_with("Created") {
            Self::Stopped
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::NotFound => "not found",
            Self::Unknown => "unknown",
        }
    }
}
