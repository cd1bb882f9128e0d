//! サービス記述子から Docker API パラメータへの変換

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::Result;
use crate::runtime::ContainerSpec;
use beebop_core::{ServiceDescriptor, StackPlan, download_databases_command};
use bollard::container::{Config, CreateContainerOptions, NetworkingConfig};
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use std::collections::{BTreeMap, HashMap};

pub const PROJECT_LABEL: &str = "beebop.project";
pub const SERVICE_LABEL: &str = "beebop.service";

/// コンテナに付与するラベル（Compose互換のグループ化を含む）
pub fn stack_labels(prefix: &str, service: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("com.docker.compose.project".to_string(), prefix.to_string());
    labels.insert("com.docker.compose.service".to_string(), service.to_string());
    labels.insert(PROJECT_LABEL.to_string(), prefix.to_string());
    labels.insert(SERVICE_LABEL.to_string(), service.to_string());
    labels
}

/// 記述子の1コンテナ分の作成パラメータ
pub fn container_spec(
    plan: &StackPlan,
    service: &ServiceDescriptor,
    container_name: &str,
) -> Result<ContainerSpec> {
    let mounts = service
        .mounts
        .iter()
        .map(|m| Ok((plan.volume_name(&m.volume)?.to_string(), m.target.clone())))
        .collect::<Result<Vec<_>>>()?;

    Ok(ContainerSpec {
        name: container_name.to_string(),
        image: service.image.to_string(),
        network: Some(plan.network.clone()),
        environment: plan.resolve_environment(service)?,
        mounts,
        ports: service.ports.clone(),
        args: service.args.clone(),
        labels: stack_labels(&plan.prefix, service.name()),
    })
}

/// データベースダウンロード用の使い捨てコンテナ
///
/// API と同じイメージ・ストレージマウントを使い、環境変数やポートは持ちません。
pub fn download_spec(
    plan: &StackPlan,
    api: &ServiceDescriptor,
    references_only: bool,
) -> Result<ContainerSpec> {
    let mounts = api
        .mounts
        .iter()
        .map(|m| Ok((plan.volume_name(&m.volume)?.to_string(), m.target.clone())))
        .collect::<Result<Vec<_>>>()?;

    Ok(ContainerSpec {
        name: format!("{}_{}_download", plan.prefix, api.name()),
        image: api.image.to_string(),
        network: None,
        environment: BTreeMap::new(),
        mounts,
        ports: Vec::new(),
        args: download_databases_command(references_only),
        labels: BTreeMap::new(),
    })
}

/// ContainerSpec を Docker のコンテナ設定に変換
pub fn to_docker_config(spec: &ContainerSpec) -> (Config<String>, CreateContainerOptions<String>) {
    let env: Vec<String> = spec
        .environment
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();
    for port in &spec.ports {
        let container_port = format!("{}/tcp", port.container);
        exposed_ports.insert(container_port.clone(), HashMap::new());
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host.to_string()),
            }]),
        );
    }

    // 名前付きボリューム
    let binds: Vec<String> = spec
        .mounts
        .iter()
        .map(|(volume, target)| format!("{}:{}", volume, target))
        .collect();

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(binds),
        network_mode: spec.network.clone(),
        ..Default::default()
    });

    let networking_config = spec.network.as_ref().map(|network| {
        let mut endpoints = HashMap::new();
        endpoints.insert(network.clone(), EndpointSettings::default());
        NetworkingConfig {
            endpoints_config: endpoints,
        }
    });

    let config = Config {
        image: Some(spec.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(spec.labels.clone().into_iter().collect()),
        cmd: if spec.args.is_empty() {
            None
        } else {
            Some(spec.args.clone())
        },
        networking_config,
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: spec.name.clone(),
        platform: None,
    };

    (config, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beebop_config::testing::SAMPLE_CONFIG;
    use beebop_config::{BeebopConfig, ConfigTree};
    use beebop_core::{ServiceKind, compose};
    use std::path::Path;

    fn plan() -> StackPlan {
        let tree = ConfigTree::parse(SAMPLE_CONFIG).unwrap();
        let config =
            BeebopConfig::from_tree(Path::new("config"), None, &tree, tree.clone()).unwrap();
        compose(&config)
    }

    #[test]
    fn test_api_container_spec() {
        let plan = plan();
        let api = plan.service(ServiceKind::Api).unwrap();
        let spec = container_spec(&plan, api, "beebop_api").unwrap();

        assert_eq!(spec.name, "beebop_api");
        assert_eq!(spec.image, "mrcide/beebop-py:main");
        assert_eq!(spec.network.as_deref(), Some("beebop_nw"));
        assert_eq!(spec.environment["REDIS_HOST"], "beebop_redis");
        assert_eq!(
            spec.mounts,
            vec![("beebop_storage".to_string(), "/beebop/storage".to_string())]
        );
        assert_eq!(spec.labels[PROJECT_LABEL], "beebop");
        assert_eq!(spec.labels[SERVICE_LABEL], "api");
    }

    #[test]
    fn test_docker_config_for_proxy() {
        let plan = plan();
        let proxy = plan.service(ServiceKind::Proxy).unwrap();
        let spec = container_spec(&plan, proxy, "beebop_proxy").unwrap();
        let (config, options) = to_docker_config(&spec);

        assert_eq!(options.name, "beebop_proxy");
        assert_eq!(config.image.as_deref(), Some("mrcide/beebop-proxy:main"));
        assert_eq!(
            config.cmd,
            Some(vec!["localhost".to_string(), "beebop_api".to_string()])
        );
        assert!(
            config
                .env
                .unwrap()
                .contains(&"UPSTREAM_HOST=beebop_api".to_string())
        );

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("80/tcp"));
        assert!(exposed.contains_key("443/tcp"));

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.network_mode.as_deref(), Some("beebop_nw"));
        let bindings = host_config.port_bindings.unwrap();
        let https = bindings["443/tcp"].as_ref().unwrap();
        assert_eq!(https[0].host_port.as_deref(), Some("443"));

        let labels = config.labels.unwrap();
        assert_eq!(labels["com.docker.compose.project"], "beebop");
        assert_eq!(labels["beebop.service"], "proxy");
    }

    #[test]
    fn test_docker_config_binds_named_volume() {
        let plan = plan();
        let worker = plan.service(ServiceKind::Worker).unwrap();
        let spec = container_spec(&plan, worker, "beebop_worker_1").unwrap();
        let (config, _) = to_docker_config(&spec);

        let binds = config.host_config.unwrap().binds.unwrap();
        assert_eq!(binds, vec!["beebop_storage:/beebop/storage".to_string()]);
        assert_eq!(config.cmd, Some(vec!["rqworker".to_string()]));
    }

    #[test]
    fn test_download_spec() {
        let plan = plan();
        let api = plan.service(ServiceKind::Api).unwrap();
        let spec = download_spec(&plan, api, false).unwrap();

        assert_eq!(spec.image, "mrcide/beebop-py:main");
        assert_eq!(spec.args, vec!["./scripts/download_db", "--small", "storage"]);
        assert!(spec.network.is_none());
        assert!(spec.labels.is_empty());

        let (config, _) = to_docker_config(&spec);
        assert!(config.networking_config.is_none());
        assert!(config.host_config.unwrap().network_mode.is_none());
    }
}
