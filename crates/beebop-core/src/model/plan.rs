//! デプロイ計画

use super::service::{EnvValue, Scale, ServiceDescriptor, ServiceKind};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 合成済みのスタック
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackPlan {
    pub prefix: String,
    pub network: String,
    /// 論理名 → 実際のボリューム名
    pub volumes: BTreeMap<String, String>,
    /// 起動順のサービス
    pub services: Vec<ServiceDescriptor>,
}

impl StackPlan {
    pub fn service(&self, kind: ServiceKind) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.kind == kind)
    }

    /// 単一コンテナサービスのコンテナ名
    pub fn container_name(&self, kind: ServiceKind) -> Result<String> {
        let service = self
            .service(kind)
            .ok_or_else(|| CoreError::ServiceNotFound(kind.to_string()))?;
        match service.scale {
            Scale::Single => Ok(format!("{}_{}", self.prefix, kind)),
            Scale::Pool(_) => Err(CoreError::PoolReference {
                service: kind.to_string(),
                target: kind.to_string(),
            }),
        }
    }

    /// 全コンテナ名（起動順、プールは展開）
    pub fn container_names(&self) -> Vec<String> {
        self.services
            .iter()
            .flat_map(|s| s.container_names(&self.prefix))
            .collect()
    }

    pub fn volume_name(&self, logical: &str) -> Result<&str> {
        self.volumes
            .get(logical)
            .map(String::as_str)
            .ok_or_else(|| CoreError::VolumeNotFound(logical.to_string()))
    }

    /// 環境変数のサービス参照をコンテナ名に解決
    pub fn resolve_environment(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<BTreeMap<String, String>> {
        service
            .environment
            .iter()
            .map(|(key, value)| {
                let resolved = match value {
                    EnvValue::Literal(s) => s.clone(),
                    EnvValue::ServiceRef(target) => {
                        self.container_name(*target).map_err(|e| match e {
                            CoreError::PoolReference { .. } => CoreError::PoolReference {
                                service: service.kind.to_string(),
                                target: target.to_string(),
                            },
                            other => other,
                        })?
                    }
                };
                Ok((key.clone(), resolved))
            })
            .collect()
    }
}
