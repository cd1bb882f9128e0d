//! スタックのライフサイクル
//!
//! `absent → starting → running → stopping → absent`
//!
//! 起動は redis → api → server → worker → proxy の順に一つずつ行い、
//! 各コンテナのフックが終わるまで次に進みません。停止は逆順です。

use crate::converter::container_spec;
use crate::error::{ContainerError, Result};
use crate::hooks::run_hook;
use crate::runtime::{ContainerRuntime, ContainerState};
use crate::waiter::WaitConfig;
use beebop_core::StackPlan;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// `stop` のオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// 停止ではなく kill する
    pub kill: bool,
    pub remove_network: bool,
    /// ボリュームを削除（データは失われます）
    pub remove_volumes: bool,
}

impl StopOptions {
    /// `destroy` 相当
    pub fn destroy() -> Self {
        Self {
            kill: true,
            remove_network: true,
            remove_volumes: true,
        }
    }
}

/// コンテナごとの状態
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub service: String,
    pub container: String,
    pub state: ContainerState,
}

pub struct Stack<'a, R> {
    runtime: &'a R,
    plan: &'a StackPlan,
    wait: WaitConfig,
}

impl<'a, R: ContainerRuntime> Stack<'a, R> {
    pub fn new(runtime: &'a R, plan: &'a StackPlan) -> Self {
        Self {
            runtime,
            plan,
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// 全サービスを起動
    ///
    /// 作成したコンテナ名を起動順に返します。
    #[instrument(skip(self), fields(prefix = %self.plan.prefix))]
    pub async fn start(&self, pull_images: bool) -> Result<Vec<String>> {
        let existing = self.existing_containers().await?;
        if !existing.is_empty() {
            return Err(ContainerError::StackAlreadyRunning {
                containers: existing.into_iter().collect(),
            });
        }

        if pull_images {
            for image in self.images() {
                self.runtime.pull_image(&image, true).await?;
            }
        }

        self.runtime.ensure_network(&self.plan.network).await?;
        for volume in self.plan.volumes.values() {
            self.runtime.ensure_volume(volume).await?;
        }

        let mut started = Vec::new();
        for service in &self.plan.services {
            let image = service.image.to_string();
            self.runtime.pull_image(&image, false).await?;

            for name in service.container_names(&self.plan.prefix) {
                let spec = container_spec(self.plan, service, &name)?;
                self.runtime.create(&spec).await?;
                self.runtime.start(&name).await?;
                debug!(container = %name, image = %image, "Container started");

                if let Some(hook) = &service.hook {
                    run_hook(self.runtime, self.plan, service, &name, hook, &self.wait)
                        .await
                        .map_err(|e| ContainerError::Hook {
                            service: service.name().to_string(),
                            source: Box::new(e),
                        })?;
                }
                started.push(name);
            }
            info!(service = service.name(), replicas = service.replicas(), "Service started");
        }

        Ok(started)
    }

    /// 全コンテナを停止・削除
    ///
    /// 削除したコンテナ名を返します。存在しないコンテナは無視します。
    #[instrument(skip(self), fields(prefix = %self.plan.prefix))]
    pub async fn stop(&self, options: StopOptions) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for name in self.stop_order().await? {
            if !self.runtime.exists(&name).await? {
                continue;
            }
            self.runtime.stop(&name, options.kill).await?;
            self.runtime.remove(&name).await?;
            debug!(container = %name, kill = options.kill, "Container removed");
            removed.push(name);
        }

        if options.remove_network {
            self.runtime.remove_network(&self.plan.network).await?;
            info!(network = %self.plan.network, "Network removed");
        }
        if options.remove_volumes {
            for volume in self.plan.volumes.values() {
                self.runtime.remove_volume(volume).await?;
                info!(volume = %volume, "Volume removed");
            }
        }

        Ok(removed)
    }

    /// 計画上の全コンテナの状態
    ///
    /// 計画にないがプロジェクトラベルを持つコンテナ（レプリカ数を減らした後の
    /// 余りのワーカーなど）も末尾に含めます。
    pub async fn status(&self) -> Result<Vec<ServiceStatus>> {
        let listed = self.runtime.list(&self.plan.prefix).await?;

        let mut statuses = Vec::new();
        for service in &self.plan.services {
            for name in service.container_names(&self.plan.prefix) {
                let state = listed
                    .iter()
                    .find(|c| c.name == name)
                    .map(|c| c.state.clone())
                    .unwrap_or(ContainerState::NotFound);
                statuses.push(ServiceStatus {
                    service: service.name().to_string(),
                    container: name,
                    state,
                });
            }
        }

        let planned: BTreeSet<String> = self.plan.container_names().into_iter().collect();
        for container in listed {
            if !planned.contains(&container.name) {
                statuses.push(ServiceStatus {
                    service: container.service.unwrap_or_else(|| "unknown".to_string()),
                    container: container.name,
                    state: container.state,
                });
            }
        }

        Ok(statuses)
    }

    /// 停止して再起動（ネットワークとボリュームは維持）
    pub async fn restart(&self, pull_images: bool) -> Result<Vec<String>> {
        self.stop(StopOptions::default()).await?;
        self.start(pull_images).await
    }

    /// 使用するイメージ（重複なし、起動順）
    fn images(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.plan
            .services
            .iter()
            .map(|s| s.image.to_string())
            .filter(|image| seen.insert(image.clone()))
            .collect()
    }

    /// 計画上またはプロジェクトラベルを持つ既存のコンテナ
    pub async fn existing_containers(&self) -> Result<BTreeSet<String>> {
        let mut existing: BTreeSet<String> = self
            .runtime
            .list(&self.plan.prefix)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        for name in self.plan.container_names() {
            if !existing.contains(&name) && self.runtime.exists(&name).await? {
                existing.insert(name);
            }
        }
        Ok(existing)
    }

    /// 起動の逆順。計画外のプロジェクトコンテナを先頭に置く
    async fn stop_order(&self) -> Result<Vec<String>> {
        let planned = self.plan.container_names();
        let mut order: Vec<String> = self
            .runtime
            .list(&self.plan.prefix)
            .await?
            .into_iter()
            .map(|c| c.name)
            .filter(|name| !planned.contains(name))
            .collect();
        order.extend(planned.into_iter().rev());
        Ok(order)
    }
}
