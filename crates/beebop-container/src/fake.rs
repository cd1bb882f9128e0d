//! テスト用のインメモリランタイム
//!
//! Docker を使わずにライフサイクルを検証するための実装です。
//! 操作はすべて [`FakeState`] に記録されます。

use crate::converter::PROJECT_LABEL;
use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus, ExecOutput};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub networks: BTreeSet<String>,
    pub volumes: BTreeSet<String>,
    pub images: BTreeSet<String>,
    pub pulls: Vec<String>,
    pub containers: BTreeMap<String, FakeContainer>,
    /// (コンテナ名, パス) → 内容
    pub files: BTreeMap<(String, String), Vec<u8>>,
    pub execs: Vec<(String, Vec<String>)>,
    pub runs: Vec<ContainerSpec>,
    /// 操作ログ ("create beebop_redis" など)
    pub events: Vec<String>,
    exec_results: BTreeMap<String, VecDeque<ExecOutput>>,
    run_result: Option<ExecOutput>,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `program` で始まる exec の結果を順番に返す（使い切ったら既定の応答）
    pub fn script_exec(&self, program: &str, outputs: Vec<ExecOutput>) {
        self.state()
            .exec_results
            .entry(program.to_string())
            .or_default()
            .extend(outputs);
    }

    /// `run_once` の結果を固定する
    pub fn set_run_result(&self, output: ExecOutput) {
        self.state().run_result = Some(output);
    }

    pub fn running(&self) -> Vec<String> {
        self.state()
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn file(&self, container: &str, path: &str) -> Option<String> {
        self.state()
            .files
            .get(&(container.to_string(), path.to_string()))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    fn not_found(name: &str) -> ContainerError {
        ContainerError::ContainerNotFound {
            container: name.to_string(),
        }
    }
}

fn default_exec(cmd: &[String]) -> ExecOutput {
    match cmd.first().map(String::as_str) {
        Some("redis-cli") => ExecOutput {
            exit_code: 0,
            output: "PONG\n".to_string(),
        },
        _ => ExecOutput::default(),
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn ensure_network(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.networks.insert(name.to_string()) {
            state.events.push(format!("network {}", name));
        }
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        let attached: Vec<String> = state
            .containers
            .iter()
            .filter(|(_, c)| c.spec.network.as_deref() == Some(name))
            .map(|(n, _)| n.clone())
            .collect();
        if !attached.is_empty() {
            return Err(ContainerError::DockerApiError(format!(
                "network {} has active endpoints: {}",
                name,
                attached.join(", ")
            )));
        }
        if state.networks.remove(name) {
            state.events.push(format!("remove-network {}", name));
        }
        Ok(())
    }

    async fn ensure_volume(&self, name: &str) -> Result<()> {
        self.state().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.volumes.remove(name) {
            state.events.push(format!("remove-volume {}", name));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str, always: bool) -> Result<()> {
        let mut state = self.state();
        if always || !state.images.contains(image) {
            state.pulls.push(image.to_string());
            state.images.insert(image.to_string());
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        let mut state = self.state();
        if state.containers.contains_key(&spec.name) {
            return Err(ContainerError::DockerApiError(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if let Some(network) = &spec.network
            && !state.networks.contains(network)
        {
            return Err(ContainerError::DockerApiError(format!(
                "network {} not found",
                network
            )));
        }
        if let Some((volume, _)) = spec.mounts.iter().find(|(v, _)| !state.volumes.contains(v)) {
            return Err(ContainerError::DockerApiError(format!(
                "volume {} not found",
                volume
            )));
        }
        if !state.images.contains(&spec.image) {
            return Err(ContainerError::ImageNotFound {
                image: spec.image.clone(),
            });
        }

        state.events.push(format!("create {}", spec.name));
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::not_found(name))?;
        container.running = true;
        state.events.push(format!("start {}", name));
        Ok(())
    }

    async fn stop(&self, name: &str, kill: bool) -> Result<()> {
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::not_found(name))?;
        container.running = false;
        let verb = if kill { "kill" } else { "stop" };
        state.events.push(format!("{} {}", verb, name));
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.containers.remove(name).is_some() {
            state.events.push(format!("remove {}", name));
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().containers.contains_key(name))
    }

    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>> {
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|(_, c)| c.spec.labels.get(PROJECT_LABEL).map(String::as_str) == Some(project))
            .map(|(name, c)| ContainerStatus {
                name: name.clone(),
                service: c.spec.labels.get(crate::converter::SERVICE_LABEL).cloned(),
                state: if c.running {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                },
                image: c.spec.image.clone(),
            })
            .collect())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        let mut state = self.state();
        match state.containers.get(name) {
            Some(c) if c.running => {}
            _ => return Err(Self::not_found(name)),
        }
        state.execs.push((name.to_string(), cmd.to_vec()));
        state.events.push(format!("exec {} {}", name, cmd.join(" ")));

        let scripted = cmd
            .first()
            .and_then(|program| state.exec_results.get_mut(program))
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| default_exec(cmd)))
    }

    async fn put_file(&self, name: &str, path: &str, content: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.containers.contains_key(name) {
            return Err(Self::not_found(name));
        }
        state
            .files
            .insert((name.to_string(), path.to_string()), content.to_vec());
        state.events.push(format!("put {} {}", name, path));
        Ok(())
    }

    async fn run_once(&self, spec: &ContainerSpec) -> Result<ExecOutput> {
        let mut state = self.state();
        if let Some((volume, _)) = spec.mounts.iter().find(|(v, _)| !state.volumes.contains(v)) {
            return Err(ContainerError::DockerApiError(format!(
                "volume {} not found",
                volume
            )));
        }
        state.runs.push(spec.clone());
        state
            .events
            .push(format!("run {} {}", spec.image, spec.args.join(" ")));
        Ok(state.run_result.clone().unwrap_or_default())
    }
}
