//! テスト用の設定フィクスチャ

use crate::beebop::BASE_FILE;
use std::path::Path;

/// 必須キーをすべて含むベース設定
pub const SAMPLE_CONFIG: &str = r#"
docker:
  network: beebop_nw
  prefix: beebop
redis:
  image:
    name: redis
    tag: "5.0"
api:
  image:
    repo: mrcide
    name: beebop-py
    tag: main
  storage_location: ./storage
  db_location: ./storage/GPS_v4_references
server:
  image:
    repo: mrcide
    name: beebop-server
    tag: main
  port: 4000
  client_url: https://localhost
  server_url: https://localhost/api
  auth:
    google:
      client_id: google-id
      secret: google-secret
    github:
      client_id: github-id
      secret: github-secret
    session_secret: session
proxy:
  image:
    repo: mrcide
    name: beebop-proxy
    tag: main
  host: localhost
  port_http: 80
  port_https: 443
worker:
  count: 2
"#;

/// `dir` にベース設定を書き込む
pub fn write_sample_config(dir: &Path) -> std::io::Result<()> {
    std::fs::write(dir.join(BASE_FILE), SAMPLE_CONFIG)
}
