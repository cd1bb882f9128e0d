//! スタック合成
//!
//! 設定から5つのサービス記述子を固定の順序で組み立てます:
//! redis → api → server → worker → proxy

use crate::model::*;
use beebop_config::BeebopConfig;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// 共有ストレージの論理ボリューム名
pub const STORAGE_VOLUME: &str = "storage";

const API_PORT: u16 = 5000;
const REDIS_PORT: u16 = 6379;

/// 設定からデプロイ計画を組み立てる（副作用なし）
pub fn compose(config: &BeebopConfig) -> StackPlan {
    let prefix = config.container_prefix.clone();
    let name_of = |kind: ServiceKind| format!("{}_{}", prefix, kind);

    let mut volumes = BTreeMap::new();
    volumes.insert(
        STORAGE_VOLUME.to_string(),
        format!("{}_{}", prefix, STORAGE_VOLUME),
    );

    let redis = ServiceDescriptor::new(ServiceKind::Redis, (&config.redis.image).into())
        .with_hook(Hook::WaitForRedis);

    let api_image: ImageReference = (&config.api.image).into();
    let api = ServiceDescriptor::new(ServiceKind::Api, api_image.clone())
        .env("REDIS_HOST", EnvValue::ServiceRef(ServiceKind::Redis))
        .literal("STORAGE_LOCATION", &config.api.storage_location)
        .literal("DB_LOCATION", &config.api.db_location)
        .mount(Mount::new(STORAGE_VOLUME, STORAGE_MOUNT))
        .with_hook(Hook::DownloadDatabases {
            references_only: config.api.references_only,
        });

    let server = ServiceDescriptor::new(ServiceKind::Server, (&config.server.image).into())
        .env("REDIS_HOST", EnvValue::ServiceRef(ServiceKind::Redis))
        .with_hook(Hook::WriteServerConfig {
            document: server_config_document(
                config,
                &name_of(ServiceKind::Api),
                &name_of(ServiceKind::Redis),
            ),
        });

    let mut worker = ServiceDescriptor::new(ServiceKind::Worker, api_image)
        .env("REDIS_HOST", EnvValue::ServiceRef(ServiceKind::Redis))
        .mount(Mount::new(STORAGE_VOLUME, STORAGE_MOUNT));
    worker.args = vec!["rqworker".to_string()];
    worker.scale = Scale::Pool(config.worker.count);

    let proxy_hook = match &config.proxy.ssl {
        Some(ssl) => Hook::InstallCertificates {
            certificate: ssl.certificate.clone(),
            key: ssl.key.clone(),
        },
        None => Hook::GenerateSelfSigned {
            host: config.proxy.host.clone(),
        },
    };
    let mut proxy = ServiceDescriptor::new(ServiceKind::Proxy, (&config.proxy.image).into())
        .env("UPSTREAM_HOST", EnvValue::ServiceRef(ServiceKind::Api))
        .with_hook(proxy_hook);
    proxy.ports = vec![
        PortMapping::same(config.proxy.port_http),
        PortMapping::same(config.proxy.port_https),
    ];
    proxy.args = vec![config.proxy.host.clone(), name_of(ServiceKind::Api)];

    let plan = StackPlan {
        prefix,
        network: config.network.clone(),
        volumes,
        services: vec![redis, api, server, worker, proxy],
    };
    debug!(
        prefix = %plan.prefix,
        containers = plan.container_names().len(),
        "Composed stack plan"
    );
    plan
}

/// サーバーコンテナに書き込む設定 JSON
pub fn server_config_document(
    config: &BeebopConfig,
    api_container: &str,
    redis_container: &str,
) -> serde_json::Value {
    let server = &config.server;
    json!({
        "server_port": server.port,
        "api_url": format!("http://{}:{}", api_container, API_PORT),
        "client_url": server.client_url,
        "server_url": server.server_url,
        "redis_url": format!("redis://{}:{}", redis_container, REDIS_PORT),
        "GOOGLE_CLIENT_ID": server.auth.google.client_id,
        "GOOGLE_CLIENT_SECRET": server.auth.google.secret,
        "GITHUB_CLIENT_ID": server.auth.github.client_id,
        "GITHUB_CLIENT_SECRET": server.auth.github.secret,
        "SESSION_SECRET": server.auth.session_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beebop_config::testing::SAMPLE_CONFIG;
    use beebop_config::{BeebopConfig, ConfigTree};
    use std::path::Path;

    fn config_from(yaml: &str) -> BeebopConfig {
        let mut tree = ConfigTree::parse(SAMPLE_CONFIG).unwrap();
        tree.merge(ConfigTree::parse(yaml).unwrap());
        BeebopConfig::from_tree(Path::new("config"), None, &tree, tree.clone()).unwrap()
    }

    #[test]
    fn test_compose_order_and_count() {
        let plan = compose(&config_from("{}"));
        let kinds: Vec<ServiceKind> = plan.services.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ServiceKind::Redis,
                ServiceKind::Api,
                ServiceKind::Server,
                ServiceKind::Worker,
                ServiceKind::Proxy,
            ]
        );
        assert_eq!(plan.services.len(), 5);
        assert_eq!(plan.network, "beebop_nw");
        assert_eq!(plan.volume_name(STORAGE_VOLUME).unwrap(), "beebop_storage");
    }

    #[test]
    fn test_every_reference_resolves_to_a_planned_container() {
        let plan = compose(&config_from("{}"));
        let containers = plan.container_names();

        for service in &plan.services {
            let env = plan.resolve_environment(service).unwrap();
            for (key, value) in &service.environment {
                if let EnvValue::ServiceRef(_) = value {
                    assert!(
                        containers.contains(&env[key]),
                        "{} -> {} is not a planned container",
                        key,
                        env[key]
                    );
                }
            }
        }
    }

    #[test]
    fn test_container_names() {
        let plan = compose(&config_from("{}"));
        assert_eq!(
            plan.container_names(),
            vec![
                "beebop_redis",
                "beebop_api",
                "beebop_server",
                "beebop_worker_1",
                "beebop_worker_2",
                "beebop_proxy",
            ]
        );
    }

    #[test]
    fn test_redis_uses_library_image() {
        let plan = compose(&config_from("{}"));
        let redis = plan.service(ServiceKind::Redis).unwrap();
        assert_eq!(redis.image.to_string(), "library/redis:5.0");
        assert_eq!(redis.hook, Some(Hook::WaitForRedis));
    }

    #[test]
    fn test_api_and_worker_share_image_and_storage() {
        let plan = compose(&config_from("{}"));
        let api = plan.service(ServiceKind::Api).unwrap();
        let worker = plan.service(ServiceKind::Worker).unwrap();

        assert_eq!(api.image, worker.image);
        assert_eq!(api.mounts, worker.mounts);
        assert_eq!(api.mounts[0].target, "/beebop/storage");
        assert_eq!(worker.args, vec!["rqworker"]);
        assert_eq!(worker.replicas(), 2);

        let env = plan.resolve_environment(api).unwrap();
        assert_eq!(env["REDIS_HOST"], "beebop_redis");
        assert_eq!(env["STORAGE_LOCATION"], "./storage");
        assert_eq!(env["DB_LOCATION"], "./storage/GPS_v4_references");
        assert_eq!(
            api.hook,
            Some(Hook::DownloadDatabases {
                references_only: false
            })
        );
    }

    #[test]
    fn test_references_only_mode() {
        let plan = compose(&config_from("api:\n  references_only: true\n"));
        let api = plan.service(ServiceKind::Api).unwrap();
        assert_eq!(
            api.hook,
            Some(Hook::DownloadDatabases {
                references_only: true
            })
        );
    }

    #[test]
    fn test_server_config_document() {
        let plan = compose(&config_from("{}"));
        let server = plan.service(ServiceKind::Server).unwrap();
        let Some(Hook::WriteServerConfig { document }) = &server.hook else {
            panic!("server must write its config");
        };

        assert_eq!(document["server_port"], 4000);
        assert_eq!(document["api_url"], "http://beebop_api:5000");
        assert_eq!(document["redis_url"], "redis://beebop_redis:6379");
        assert_eq!(document["client_url"], "https://localhost");
        assert_eq!(document["server_url"], "https://localhost/api");
        assert_eq!(document["GOOGLE_CLIENT_ID"], "google-id");
        assert_eq!(document["GOOGLE_CLIENT_SECRET"], "google-secret");
        assert_eq!(document["GITHUB_CLIENT_ID"], "github-id");
        assert_eq!(document["GITHUB_CLIENT_SECRET"], "github-secret");
        assert_eq!(document["SESSION_SECRET"], "session");
    }

    #[test]
    fn test_proxy_without_ssl_generates_certificate() {
        let plan = compose(&config_from("{}"));
        let proxy = plan.service(ServiceKind::Proxy).unwrap();

        assert_eq!(proxy.args, vec!["localhost", "beebop_api"]);
        assert_eq!(proxy.ports, vec![PortMapping::same(80), PortMapping::same(443)]);
        assert_eq!(
            plan.resolve_environment(proxy).unwrap()["UPSTREAM_HOST"],
            "beebop_api"
        );
        assert_eq!(
            proxy.hook,
            Some(Hook::GenerateSelfSigned {
                host: "localhost".to_string()
            })
        );
    }

    #[test]
    fn test_proxy_with_ssl_installs_certificate() {
        let plan = compose(&config_from(
            "proxy:\n  ssl:\n    certificate: CERT\n    key: KEY\n",
        ));
        let proxy = plan.service(ServiceKind::Proxy).unwrap();
        assert_eq!(
            proxy.hook,
            Some(Hook::InstallCertificates {
                certificate: "CERT".to_string(),
                key: "KEY".to_string()
            })
        );
    }

    #[test]
    fn test_reference_to_pool_is_rejected() {
        let mut plan = compose(&config_from("{}"));
        plan.services[1]
            .environment
            .insert("WORKER".to_string(), EnvValue::ServiceRef(ServiceKind::Worker));

        let err = plan.resolve_environment(&plan.services[1]).unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::PoolReference { ref service, ref target }
                if service == "api" && target == "worker"
        ));
    }
}
