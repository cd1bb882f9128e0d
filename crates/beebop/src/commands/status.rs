use crate::utils;
use beebop_container::{ContainerRuntime, ContainerState, ServiceStatus, Stack};
use colored::Colorize;
use std::path::Path;

fn colored_state(state: &ContainerState) -> colored::ColoredString {
    match state {
        ContainerState::Running => state.as_str().green(),
        ContainerState::Stopped | ContainerState::Paused => state.as_str().yellow(),
        ContainerState::NotFound => state.as_str().dimmed(),
        ContainerState::Unknown => state.as_str().red(),
    }
}

pub async fn handle<R: ContainerRuntime>(
    runtime: &R,
    config_path: &Path,
) -> anyhow::Result<Vec<ServiceStatus>> {
    let config = utils::load_config(config_path, None).await?;
    let plan = beebop_core::compose(&config);

    let statuses = Stack::new(runtime, &plan).status().await?;

    println!();
    println!(
        "{}",
        format!("{:<10} {:<28} {}", "SERVICE", "CONTAINER", "STATE").bold()
    );
    for status in &statuses {
        println!(
            "{:<10} {:<28} {}",
            status.service.cyan(),
            status.container,
            colored_state(&status.state)
        );
    }

    let running = statuses
        .iter()
        .filter(|s| s.state == ContainerState::Running)
        .count();
    println!();
    println!("{}/{} コンテナが起動中", running, statuses.len());

    Ok(statuses)
}
