//! YAML設定ツリー
//!
//! 設定ファイルを `serde_yaml::Value` のまま保持し、マージ・上書き・
//! 型付きアクセスを提供します。型付きアクセスはすべてドット区切りの
//! パスをエラーに含めます。

use crate::error::{ConfigError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::debug;

/// 設定ツリー
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self {
            root: Value::Mapping(Mapping::new()),
        }
    }
}

impl ConfigTree {
    pub fn new(root: Value) -> Self {
        match root {
            Value::Null => Self::default(),
            other => Self { root: other },
        }
    }

    /// YAMLファイルを読み込む
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// YAML文字列をパース
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let root: Value = serde_yaml::from_str(content)?;
        Ok(Self::new(root))
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// 別のツリーを上に重ねる
    ///
    /// マッピング同士は再帰的にマージし、それ以外は上書きします。
    pub fn merge(&mut self, overlay: ConfigTree) {
        merge_values(&mut self.root, overlay.root);
    }

    /// ドット区切りのパスに値を設定（途中のマッピングは自動生成）
    pub fn set(&mut self, dotted: &str, value: Value) -> Result<()> {
        let keys: Vec<&str> = dotted.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::InvalidOption(dotted.to_string()));
        }

        let mut current = &mut self.root;
        for key in &keys[..keys.len() - 1] {
            if !matches!(current, Value::Mapping(_)) {
                *current = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(map) = current else {
                return Err(ConfigError::InvalidOption(dotted.to_string()));
            };
            current = map
                .entry(Value::String(key.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }

        if !matches!(current, Value::Mapping(_)) {
            *current = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(map) = current {
            map.insert(Value::String(keys[keys.len() - 1].to_string()), value);
        }
        debug!(path = %dotted, "Applied config option");
        Ok(())
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for key in path {
            current = current.as_mapping()?.get(*key)?;
        }
        match current {
            Value::Null => None,
            value => Some(value),
        }
    }

    pub fn contains(&self, path: &[&str]) -> bool {
        self.get(path).is_some()
    }

    fn require(&self, path: &[&str]) -> Result<&Value> {
        self.get(path).ok_or_else(|| ConfigError::MissingField {
            path: path.join("."),
        })
    }

    /// 文字列フィールド（数値はそのまま文字列化）
    pub fn string(&self, path: &[&str]) -> Result<String> {
        match self.require(path)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(type_mismatch(path, "string")),
        }
    }

    pub fn integer(&self, path: &[&str]) -> Result<i64> {
        self.require(path)?
            .as_i64()
            .ok_or_else(|| type_mismatch(path, "integer"))
    }

    pub fn port(&self, path: &[&str]) -> Result<u16> {
        let value = self.integer(path)?;
        u16::try_from(value).map_err(|_| type_mismatch(path, "port number (0-65535)"))
    }

    pub fn count(&self, path: &[&str]) -> Result<u32> {
        let value = self.integer(path)?;
        u32::try_from(value)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| type_mismatch(path, "positive integer"))
    }

    pub fn boolean(&self, path: &[&str]) -> Result<bool> {
        self.require(path)?
            .as_bool()
            .ok_or_else(|| type_mismatch(path, "boolean"))
    }

    pub fn optional_string(&self, path: &[&str]) -> Result<Option<String>> {
        if self.contains(path) {
            self.string(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn optional_boolean(&self, path: &[&str]) -> Result<Option<bool>> {
        if self.contains(path) {
            self.boolean(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// ツリー内のすべての文字列値を走査し、`f` が `Some` を返したものを置き換える
    ///
    /// 置き換えた数を返します。
    pub fn rewrite_strings<F>(&mut self, mut f: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<Option<String>>,
    {
        rewrite_value(&mut self.root, &mut f)
    }

    /// ツリー内の文字列値のうち、条件に一致するものを収集
    pub fn find_strings(&self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let mut found = Vec::new();
        collect_strings(&self.root, &pred, &mut found);
        found
    }
}

fn type_mismatch(path: &[&str], expected: &'static str) -> ConfigError {
    ConfigError::TypeMismatch {
        path: path.join("."),
        expected,
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn rewrite_value<F>(value: &mut Value, f: &mut F) -> Result<usize>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    match value {
        Value::String(s) => match f(s)? {
            Some(replacement) => {
                *s = replacement;
                Ok(1)
            }
            None => Ok(0),
        },
        Value::Mapping(map) => {
            let mut count = 0;
            for (_, v) in map.iter_mut() {
                count += rewrite_value(v, f)?;
            }
            Ok(count)
        }
        Value::Sequence(seq) => {
            let mut count = 0;
            for v in seq.iter_mut() {
                count += rewrite_value(v, f)?;
            }
            Ok(count)
        }
        _ => Ok(0),
    }
}

fn collect_strings(value: &Value, pred: &impl Fn(&str) -> bool, found: &mut Vec<String>) {
    match value {
        Value::String(s) if pred(s) => found.push(s.clone()),
        Value::Mapping(map) => {
            for (_, v) in map {
                collect_strings(v, pred, found);
            }
        }
        Value::Sequence(seq) => {
            for v in seq {
                collect_strings(v, pred, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(yaml: &str) -> ConfigTree {
        ConfigTree::parse(yaml).unwrap()
    }

    #[test]
    fn test_merge_is_recursive() {
        let mut base = tree(
            r#"
proxy:
  host: localhost
  port_http: 80
server:
  port: 4000
"#,
        );
        base.merge(tree(
            r#"
proxy:
  host: beebop.dide.ic.ac.uk
"#,
        ));

        assert_eq!(base.string(&["proxy", "host"]).unwrap(), "beebop.dide.ic.ac.uk");
        assert_eq!(base.integer(&["proxy", "port_http"]).unwrap(), 80);
        assert_eq!(base.integer(&["server", "port"]).unwrap(), 4000);
    }

    #[test]
    fn test_merge_replaces_non_mappings() {
        let mut base = tree("proxy:\n  ssl:\n    certificate: a\n");
        base.merge(tree("proxy:\n  ssl: ~\n"));
        assert!(!base.contains(&["proxy", "ssl"]));
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut base = ConfigTree::default();
        base.set("worker.count", Value::from(3)).unwrap();
        assert_eq!(base.count(&["worker", "count"]).unwrap(), 3);
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        let mut base = ConfigTree::default();
        assert!(matches!(
            base.set("worker..count", Value::from(3)),
            Err(ConfigError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_missing_field_names_path() {
        let base = tree("server:\n  port: 4000\n");
        let err = base.string(&["server", "client_url"]).unwrap_err();
        match err {
            ConfigError::MissingField { path } => assert_eq!(path, "server.client_url"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch_names_path() {
        let base = tree("server:\n  port: four-thousand\n");
        let err = base.port(&["server", "port"]).unwrap_err();
        match err {
            ConfigError::TypeMismatch { path, expected } => {
                assert_eq!(path, "server.port");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_numeric_tag_reads_as_string() {
        let base = tree("redis:\n  image:\n    tag: 7\n");
        assert_eq!(base.string(&["redis", "image", "tag"]).unwrap(), "7");
    }

    #[test]
    fn test_count_must_be_positive() {
        let base = tree("worker:\n  count: 0\n");
        assert!(matches!(
            base.count(&["worker", "count"]),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_rewrite_strings() {
        let mut base = tree("a: VAULT:x:y\nb:\n  - plain\n  - VAULT:z:w\n");
        let count = base
            .rewrite_strings(|s| Ok(s.strip_prefix("VAULT:").map(str::to_uppercase)))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(base.string(&["a"]).unwrap(), "X:Y");
        assert_eq!(
            base.find_strings(|s| s.contains(':')),
            vec!["X:Y".to_string(), "Z:W".to_string()]
        );
    }
}
