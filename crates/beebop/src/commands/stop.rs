use crate::utils;
use beebop_config::RecordStore;
use beebop_container::{ContainerRuntime, Stack, StopOptions};
use colored::Colorize;
use std::path::Path;

pub async fn handle<R: ContainerRuntime>(
    runtime: &R,
    config_path: &Path,
    options: StopOptions,
) -> anyhow::Result<()> {
    println!("{}", "beebop を停止中...".yellow());

    let store = RecordStore::new(config_path);
    let lock = store.acquire_lock().await?;

    let config = utils::load_config(config_path, None).await?;
    let plan = beebop_core::compose(&config);

    let stack = Stack::new(runtime, &plan);
    let removed = stack.stop(options).await?;

    if removed.is_empty() {
        println!("  ℹ 起動中のコンテナはありません");
    }
    for container in &removed {
        println!("  ✓ {} を削除しました", container.cyan());
    }
    if options.remove_network {
        println!("  ✓ ネットワーク {} を削除しました", plan.network.cyan());
    }
    if options.remove_volumes {
        for volume in plan.volumes.values() {
            println!("  ✓ ボリューム {} を削除しました", volume.cyan());
        }
        utils::remove_record(&store).await?;
    }
    lock.release().await?;

    println!();
    println!("{}", "✓ 停止しました".green().bold());
    Ok(())
}
