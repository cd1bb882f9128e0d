use beebop_config::{BeebopConfig, DeploymentRecord, RecordStore};
use beebop_core::StackPlan;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;

/// 設定を読み込む
///
/// 名前が指定されていない場合は、前回 `start` した設定名を使います。
pub async fn load_config(config_path: &Path, name: Option<&str>) -> anyhow::Result<BeebopConfig> {
    let name = match name {
        Some(name) => Some(name.to_string()),
        None => match RecordStore::new(config_path).load().await? {
            Some(record) => {
                print_loaded_record(&record);
                record.config_name
            }
            None => None,
        },
    };

    let config = beebop_config::load(config_path, name.as_deref(), &BTreeMap::new())?;
    Ok(config)
}

fn print_loaded_record(record: &DeploymentRecord) {
    let age = record.age(chrono::Utc::now());
    println!(
        "{}",
        format!(
            "[Loaded configuration '{}' ({} ago)]",
            record.display_name(),
            humantime::format_duration(age)
        )
        .dimmed()
    );
}

/// 起動順のコンテナ一覧を表示
pub fn print_plan(plan: &StackPlan) {
    println!();
    println!(
        "{}",
        format!("サービス一覧 ({} 個):", plan.services.len()).bold()
    );
    for service in &plan.services {
        let names = service.container_names(&plan.prefix);
        println!(
            "  • {} {} ({})",
            service.name().cyan(),
            service.image.to_string().dimmed(),
            names.join(", ")
        );
    }
}

/// 現在の設定を記録
pub async fn save_record(store: &RecordStore, config: &BeebopConfig) -> anyhow::Result<()> {
    let record = DeploymentRecord::new(config.name.clone(), config.snapshot.as_value().clone());
    store.save(&record).await?;
    Ok(())
}

/// 記録を削除
pub async fn remove_record(store: &RecordStore) -> anyhow::Result<()> {
    if store.remove().await? {
        println!("Removing configuration");
    }
    Ok(())
}
