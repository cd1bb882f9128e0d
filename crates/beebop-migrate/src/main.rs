use beebop_migrate::folders::{self, MigrationReport};
use beebop_migrate::{DEFAULT_OUTPUT_DIR, DEFAULT_REDIS_URL, KeyReport, RedisStore};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "beebop-migrate")]
#[command(about = "beebop の出力データを visualise 形式に移行", long_about = None)]
struct Cli {
    /// poppunk の出力ディレクトリ
    #[arg(long, global = true, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Redis の URL
    #[arg(long, global = true, env = "BEEBOP_REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    redis_url: String,

    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// すべての移行を実行（バックアップ → Redis → フォルダ）
    Run,
    /// Redis のキーのみ移行
    Redis,
    /// 出力フォルダのみ移行（バックアップを含む）
    Folders,
    /// 移行時に作成したバックアップフォルダを削除
    #[command(name = "cleanup-backups")]
    CleanupBackups,
    /// 旧名前空間の Redis キーを削除
    #[command(name = "cleanup-redis")]
    CleanupRedis,
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

fn print_key_report(report: &KeyReport) {
    println!("{}", "Redis キー:".bold());
    if report.copied.is_empty() {
        println!("  ℹ 移行対象のキーはありません");
    }
    for (from, to) in &report.copied {
        println!("  ✓ {} → {}", from, to.cyan());
    }
    println!(
        "  {} キー / {} フィールドをコピー",
        report.copied.len(),
        report.fields
    );
}

fn print_folder_report(report: &MigrationReport) {
    println!("{}", "出力フォルダ:".bold());
    println!("  バックアップ作成:       {}", report.backups);
    println!("  pruned コピー追加:      {}", report.pruned_copies);
    println!("  フォルダのリネーム:     {}", report.renamed_folders);
    println!("  ファイルのリネーム:     {}", report.renamed_files);
    println!("  CSV のコピー:           {}", report.csv_copies);
    println!("  GraphML のコピー:       {}", report.graphml_copies);
    if report.skipped > 0 {
        println!(
            "  {}",
            format!("⚠ スキップ: {} (ログを確認してください)", report.skipped).yellow()
        );
    }
    if report.changes() == 0 {
        println!("  ℹ 変更はありません（移行済み）");
    }
}

fn run_redis(url: &str) -> anyhow::Result<()> {
    let mut store = RedisStore::connect(url)?;
    let report = beebop_migrate::migrate_keys(&mut store)?;
    print_key_report(&report);
    Ok(())
}

fn run_all(output_dir: &Path, redis_url: &str) -> anyhow::Result<()> {
    let mut report = MigrationReport::default();
    let output_folders = folders::output_folders(output_dir)?;
    folders::create_backups(&output_folders, &mut report)?;

    run_redis(redis_url)?;
    println!();

    folders::migrate_tree(&output_folders, &mut report)?;
    print_folder_report(&report);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run => {
            println!("{}", "データ移行を開始します...".green());
            run_all(&cli.output_dir, &cli.redis_url)?;
            println!();
            println!("{}", "✓ 移行が完了しました".green().bold());
        }
        Commands::Redis => run_redis(&cli.redis_url)?,
        Commands::Folders => {
            let report = beebop_migrate::migrate_folders(&cli.output_dir)?;
            print_folder_report(&report);
        }
        Commands::CleanupBackups => {
            let removed = beebop_migrate::cleanup_backups(&cli.output_dir)?;
            if removed.is_empty() {
                println!("ℹ バックアップフォルダはありません");
            }
            for folder in removed {
                println!("✓ 削除しました: {}", folder.display());
            }
        }
        Commands::CleanupRedis => {
            let mut store = RedisStore::connect(&cli.redis_url)?;
            let deleted = beebop_migrate::cleanup_keys(&mut store)?;
            if deleted.is_empty() {
                println!("ℹ 削除対象のキーはありません");
            }
            for key in deleted {
                println!("✓ 削除しました: {}", key);
            }
        }
    }

    Ok(())
}
