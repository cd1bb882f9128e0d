mod commands;
mod docker;
mod utils;

use beebop_container::StopOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beebop")]
#[command(about = "beebop のアプリケーションスタックをデプロイ・管理", long_about = None)]
struct Cli {
    /// 設定ディレクトリ（省略時は ./config、次に ~/.config/beebop）
    #[arg(long, global = true, env = "BEEBOP_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// スタックを起動
    Start {
        /// 起動前に最新イメージをpullする
        #[arg(long)]
        pull: bool,
        /// 設定名（<config>/<name>.yml）。省略時は前回の設定
        name: Option<String>,
    },
    /// スタックを停止（コンテナは削除されます）
    Stop {
        /// 停止ではなく kill する
        #[arg(long)]
        kill: bool,
        /// ネットワークも削除
        #[arg(long)]
        network: bool,
        /// ボリュームも削除（データは失われます）
        #[arg(long)]
        volumes: bool,
    },
    /// コンテナ・ネットワーク・ボリュームをすべて削除
    Destroy,
    /// コンテナの状態を表示
    Status,
    /// 最新イメージで再起動
    Upgrade,
    /// バージョン情報を表示
    Version,
}

impl Commands {
    fn stop_options(&self) -> Option<StopOptions> {
        match *self {
            Commands::Stop {
                kill,
                network,
                volumes,
            } => Some(StopOptions {
                kill,
                remove_network: network,
                remove_volumes: volumes,
            }),
            Commands::Destroy => Some(StopOptions::destroy()),
            _ => None,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("beebop {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = beebop_config::find_config_dir(cli.config_path.as_deref())?;
    tracing::debug!(path = %config_path.display(), "Using configuration directory");

    let runtime = docker::init_docker_with_error_handling().await?;

    if let Some(options) = cli.command.stop_options() {
        return commands::stop::handle(&runtime, &config_path, options).await;
    }

    match cli.command {
        Commands::Start { pull, name } => {
            commands::start::handle(&runtime, &config_path, name, pull).await?;
        }
        Commands::Status => {
            commands::status::handle(&runtime, &config_path).await?;
        }
        Commands::Upgrade => {
            commands::upgrade::handle(&runtime, &config_path).await?;
        }
        Commands::Stop { .. } | Commands::Destroy | Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("beebop").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_stop_flags() {
        let cli = parse(&["stop", "--kill", "--network"]);
        assert_eq!(
            cli.command.stop_options(),
            Some(StopOptions {
                kill: true,
                remove_network: true,
                remove_volumes: false,
            })
        );
    }

    #[test]
    fn test_plain_stop() {
        let cli = parse(&["stop"]);
        assert_eq!(cli.command.stop_options(), Some(StopOptions::default()));
    }

    #[test]
    fn test_destroy_sets_everything() {
        let cli = parse(&["destroy"]);
        assert_eq!(
            cli.command.stop_options(),
            Some(StopOptions {
                kill: true,
                remove_network: true,
                remove_volumes: true,
            })
        );
    }

    #[test]
    fn test_start_arguments() {
        let cli = parse(&["start", "--pull", "staging"]);
        match cli.command {
            Commands::Start { pull, name } => {
                assert!(pull);
                assert_eq!(name.as_deref(), Some("staging"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_path() {
        let cli = parse(&["status", "--config-path", "/srv/beebop/config"]);
        assert_eq!(cli.config_path, Some(PathBuf::from("/srv/beebop/config")));
        assert!(cli.command.stop_options().is_none());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let result = Cli::try_parse_from(["beebop", "stop", "--force"]);
        assert!(result.is_err());
        let result = Cli::try_parse_from(["beebop", "restart"]);
        assert!(result.is_err());
    }
}
