use crate::utils;
use beebop_config::RecordStore;
use beebop_container::{ContainerRuntime, Stack};
use colored::Colorize;
use std::path::Path;

/// 最新イメージを取得して再起動
pub async fn handle<R: ContainerRuntime>(runtime: &R, config_path: &Path) -> anyhow::Result<()> {
    println!("{}", "beebop をアップグレード中...".green());

    let store = RecordStore::new(config_path);
    let lock = store.acquire_lock().await?;

    let config = utils::load_config(config_path, None).await?;
    let plan = beebop_core::compose(&config);
    utils::print_plan(&plan);

    let started = Stack::new(runtime, &plan).restart(true).await?;

    println!();
    for container in &started {
        println!("  ✓ {}", container.cyan());
    }

    utils::save_record(&store, &config).await?;
    lock.release().await?;

    println!();
    println!("{}", "✓ アップグレードが完了しました".green().bold());
    Ok(())
}
