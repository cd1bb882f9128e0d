use beebop_container::DockerRuntime;
use colored::Colorize;

/// Docker 接続を初期化（エラー時は解決方法を表示）
pub async fn init_docker_with_error_handling() -> anyhow::Result<DockerRuntime> {
    match DockerRuntime::connect().await {
        Ok(runtime) => Ok(runtime),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            eprintln!("  • DOCKER_HOST 環境変数を確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}
