use crate::utils;
use beebop_config::{BeebopConfig, ConfigTree, RecordStore};
use beebop_container::{ContainerError, ContainerRuntime, Stack};
use colored::Colorize;
use std::path::Path;

pub async fn handle<R: ContainerRuntime>(
    runtime: &R,
    config_path: &Path,
    name: Option<String>,
    pull: bool,
) -> anyhow::Result<()> {
    println!("{}", "beebop を起動中...".green());

    let store = RecordStore::new(config_path);
    let lock = store.acquire_lock().await?;

    if let Some(name) = name.as_deref() {
        ensure_previous_stopped(runtime, config_path, &store, name).await?;
    }

    let config = utils::load_config(config_path, name.as_deref()).await?;
    let plan = beebop_core::compose(&config);
    utils::print_plan(&plan);

    if pull {
        println!();
        println!("{}", "最新イメージを取得します".blue());
    }

    let stack = Stack::new(runtime, &plan);
    let started = stack.start(pull).await?;

    println!();
    for container in &started {
        println!("  ✓ {}", container.cyan());
    }

    utils::save_record(&store, &config).await?;
    lock.release().await?;

    println!();
    println!("{}", "✓ すべてのサービスが起動しました".green().bold());
    Ok(())
}

/// 前回と異なる設定で起動する場合、前回のデプロイが残っていないことを確認
///
/// 記録されたツリーから前回の計画を組み立て、そのコンテナが一つでもあればエラー。
/// 記録は上書きしません。
async fn ensure_previous_stopped<R: ContainerRuntime>(
    runtime: &R,
    config_path: &Path,
    store: &RecordStore,
    name: &str,
) -> anyhow::Result<()> {
    let Some(record) = store.load().await? else {
        return Ok(());
    };
    if record.config_name.as_deref() == Some(name) {
        return Ok(());
    }

    let tree = ConfigTree::new(record.data.clone());
    let previous = BeebopConfig::from_tree(
        config_path,
        record.config_name.as_deref(),
        &tree,
        tree.clone(),
    )?;
    let plan = beebop_core::compose(&previous);
    let existing = Stack::new(runtime, &plan).existing_containers().await?;
    if existing.is_empty() {
        return Ok(());
    }

    eprintln!(
        "{}",
        format!(
            "✗ 前回の設定 '{}' のデプロイが起動中です",
            record.display_name()
        )
        .red()
    );
    Err(ContainerError::StackAlreadyRunning {
        containers: existing.into_iter().collect(),
    }
    .into())
}
