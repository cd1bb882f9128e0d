//! Docker (bollard) によるランタイム実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::converter::{PROJECT_LABEL, SERVICE_LABEL, to_docker_config};
use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus, ExecOutput};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::query_parameters::{
    InspectContainerOptions, InspectNetworkOptions, KillContainerOptions, LogsOptions,
    RemoveContainerOptions, RemoveVolumeOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// ローカルの Docker に接続し、疎通を確認
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn collect_output(
        output: impl futures_util::Stream<Item = std::result::Result<LogOutput, BollardError>>,
    ) -> Result<String> {
        let mut output = Box::pin(output);
        let mut text = String::new();
        while let Some(msg) = output.next().await {
            match msg? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => {
                    text.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(text)
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn ensure_network(&self, name: &str) -> Result<()> {
        if self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await
            .is_ok()
        {
            debug!(network = %name, "Network already exists");
            return Ok(());
        }

        let network_config = bollard::models::NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };
        match self.docker.create_network(network_config).await {
            Ok(_) => {
                info!(network = %name, "Network created");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        match self.docker.remove_network(name).await {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(network = %name, "Network does not exist");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_volume(&self, name: &str) -> Result<()> {
        // 既存のボリュームはそのまま返される
        let options = bollard::models::VolumeCreateOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        self.docker.create_volume(options).await?;
        debug!(volume = %name, "Volume ready");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str, always: bool) -> Result<()> {
        if !always && self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        let (image_name, tag) = parse_image_tag(image);
        info!(image = %image, "Pulling image");

        let credentials = extract_registry(image).and_then(get_docker_credentials);
        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, credentials);
        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    ..
                }) => {
                    debug!(image = %image, "{}", status);
                }
                Ok(_) => {}
                Err(BollardError::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    return Err(ContainerError::ImageNotFound {
                        image: image.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        let (config, options) = to_docker_config(spec);
        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                debug!(container = %spec.name, id = %response.id, "Container created");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::ImageNotFound {
                image: spec.image.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions>)
            .await
        {
            Ok(_)
            | Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::ContainerNotFound {
                container: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop(&self, name: &str, kill: bool) -> Result<()> {
        let result = if kill {
            self.docker
                .kill_container(name, None::<KillContainerOptions>)
                .await
        } else {
            self.docker
                .stop_container(name, None::<StopContainerOptions>)
                .await
        };

        match result {
            // 304: 既に停止済み / 409: kill 対象が起動していない
            Ok(_)
            | Err(BollardError::DockerResponseServerError {
                status_code: 304 | 409,
                ..
            }) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::ContainerNotFound {
                container: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(_)
            | Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", PROJECT_LABEL, project)],
        );
        let options = bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerStatus {
                name: c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                service: c
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(SERVICE_LABEL).cloned()),
                state: c
                    .status
                    .as_deref()
                    .map(ContainerState::from_docker_status)
                    .unwrap_or(ContainerState::Unknown),
                image: c.image.unwrap_or_default(),
            })
            .collect())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        let exec_config = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = match self.docker.create_exec(name, exec_config).await {
            Ok(message) => message,
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                return Err(ContainerError::ContainerNotFound {
                    container: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let output = match self
            .docker
            .start_exec(&message.id, Some(StartExecOptions::default()))
            .await?
        {
            StartExecResults::Attached { output, .. } => Self::collect_output(output).await?,
            StartExecResults::Detached => String::new(),
        };

        let inspect = self.docker.inspect_exec(&message.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(0);
        debug!(container = %name, command = %cmd.join(" "), exit_code, "Exec finished");

        Ok(ExecOutput { exit_code, output })
    }

    async fn put_file(&self, name: &str, path: &str, content: &[u8]) -> Result<()> {
        let (dir, file_name) = split_container_path(path);
        let archive = single_file_archive(file_name, content)?;

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(name, Some(options), Either::Left(Full::new(Bytes::from(archive))))
            .await?;

        debug!(container = %name, path = %path, bytes = content.len(), "File written");
        Ok(())
    }

    async fn run_once(&self, spec: &ContainerSpec) -> Result<ExecOutput> {
        // 前回の失敗で残ったコンテナを掃除
        self.remove(&spec.name).await?;

        self.create(spec).await?;
        self.start(&spec.name).await?;

        let mut exit_code = 0;
        let mut stream = Box::pin(
            self.docker
                .wait_container(&spec.name, None::<WaitContainerOptions>),
        );
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                Err(BollardError::DockerContainerWaitError { code, .. }) => exit_code = code,
                Err(e) => {
                    self.remove(&spec.name).await?;
                    return Err(e.into());
                }
            }
        }

        let logs = self.docker.logs(
            &spec.name,
            Some(LogsOptions {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        let output = Self::collect_output(logs).await.unwrap_or_default();

        self.remove(&spec.name).await?;
        debug!(container = %spec.name, exit_code, "One-off container finished");

        Ok(ExecOutput { exit_code, output })
    }
}

/// `/dir/file` を (`/dir`, `file`) に分割
fn split_container_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", file)) => ("/", file),
        Some((dir, file)) => (dir, file),
        None => (".", path),
    }
}

/// 1ファイルだけを含む tar アーカイブ
fn single_file_archive(file_name: &str, content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut archive_data = Vec::new();
    {
        let mut tar = tar::Builder::new(&mut archive_data);
        let mut header = tar::Header::new_gnu();
        header.set_path(file_name)?;
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, content)?;
        tar.finish()?;
    }
    Ok(archive_data)
}

/// Docker config.json からレジストリの認証情報を取得
pub fn get_docker_credentials(registry: &str) -> Option<bollard::auth::DockerCredentials> {
    let home = std::env::var("HOME").ok()?;
    let config_path = format!("{}/.docker/config.json", home);
    let config_content = std::fs::read_to_string(&config_path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&config_content).ok()?;

    let auths = config.get("auths")?.as_object()?;
    let auth_entry = auths.get(registry)?;
    let auth_b64 = auth_entry.get("auth")?.as_str()?;

    // Base64 デコード (username:password 形式)
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()?;
    let auth_str = String::from_utf8(decoded).ok()?;
    let (username, password) = auth_str.split_once(':')?;

    Some(bollard::auth::DockerCredentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    })
}

/// イメージ名からレジストリを抽出（最初のセグメントが `.` か `:` を含む場合）
pub fn extract_registry(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    if first.contains('.') || first.contains(':') {
        Some(first)
    } else {
        None
    }
}

/// イメージ名とタグを分離
/// 例: "mrcide/beebop-py:main" -> ("mrcide/beebop-py", "main")
///     "localhost:5000/redis" -> ("localhost:5000/redis", "latest")
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(
            parse_image_tag("mrcide/beebop-py:main"),
            ("mrcide/beebop-py", "main")
        );
        assert_eq!(parse_image_tag("library/redis:5.0"), ("library/redis", "5.0"));
        assert_eq!(
            parse_image_tag("localhost:5000/redis"),
            ("localhost:5000/redis", "latest")
        );
    }

    #[test]
    fn test_extract_registry() {
        assert_eq!(extract_registry("ghcr.io/bacpop/beebop:main"), Some("ghcr.io"));
        assert_eq!(
            extract_registry("localhost:5000/redis:7"),
            Some("localhost:5000")
        );
        assert_eq!(extract_registry("mrcide/beebop-py:main"), None);
        assert_eq!(extract_registry("redis"), None);
    }

    #[test]
    fn test_split_container_path() {
        assert_eq!(
            split_container_path("/app/src/resources/config.json"),
            ("/app/src/resources", "config.json")
        );
        assert_eq!(split_container_path("/key.pem"), ("/", "key.pem"));
        assert_eq!(split_container_path("key.pem"), (".", "key.pem"));
    }

    #[test]
    fn test_single_file_archive() {
        let archive = single_file_archive("certificate.pem", b"CERT").unwrap();
        let mut reader = tar::Archive::new(&archive[..]);
        let mut entries = reader.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();

        assert_eq!(
            entry.path().unwrap().to_str(),
            Some("certificate.pem")
        );
        let mut content = String::new();
        std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
        assert_eq!(content, "CERT");
        assert!(entries.next().is_none());
    }
}
