//! サービス記述子

use super::hook::Hook;
use super::image::ImageReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// スタックを構成するサービスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Redis,
    Api,
    Server,
    Worker,
    Proxy,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Api => "api",
            Self::Server => "server",
            Self::Worker => "worker",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 環境変数の値
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvValue {
    Literal(String),
    /// 別サービスのコンテナ名（合成時に解決）
    ServiceRef(ServiceKind),
}

/// 論理ボリュームのマウント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// 論理名（実際の名前は `<prefix>_<volume>`）
    pub volume: String,
    pub target: String,
}

impl Mount {
    pub fn new(volume: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    /// ホストとコンテナで同じ番号を使う
    pub fn same(port: u16) -> Self {
        Self {
            host: port,
            container: port,
        }
    }
}

/// レプリカ構成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// `<prefix>_<service>` の単一コンテナ
    Single,
    /// `<prefix>_<service>_<i>` (1始まり) の同質なコンテナ群
    Pool(u32),
}

impl Scale {
    pub fn count(&self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Pool(n) => *n,
        }
    }
}

/// サービス記述子
///
/// 合成時に一度だけ作られ、以降は変更されません。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    pub image: ImageReference,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
    #[serde(default)]
    pub args: Vec<String>,
    pub hook: Option<Hook>,
    pub scale: Scale,
}

impl ServiceDescriptor {
    pub fn new(kind: ServiceKind, image: ImageReference) -> Self {
        Self {
            kind,
            image,
            ports: Vec::new(),
            mounts: Vec::new(),
            environment: BTreeMap::new(),
            args: Vec::new(),
            hook: None,
            scale: Scale::Single,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn replicas(&self) -> u32 {
        self.scale.count()
    }

    /// 実際のコンテナ名（プールは全レプリカ）
    pub fn container_names(&self, prefix: &str) -> Vec<String> {
        match self.scale {
            Scale::Single => vec![format!("{}_{}", prefix, self.name())],
            Scale::Pool(n) => (1..=n)
                .map(|i| format!("{}_{}_{}", prefix, self.name(), i))
                .collect(),
        }
    }

    pub fn env(mut self, key: &str, value: EnvValue) -> Self {
        self.environment.insert(key.to_string(), value);
        self
    }

    pub fn literal(self, key: &str, value: impl Into<String>) -> Self {
        self.env(key, EnvValue::Literal(value.into()))
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hook = Some(hook);
        self
    }
}
