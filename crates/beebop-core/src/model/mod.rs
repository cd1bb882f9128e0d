//! モデル定義
//!
//! スタックを構成するサービス記述子とデプロイ計画を定義します。

mod hook;
mod image;
mod plan;
mod service;

// Re-exports
pub use hook::*;
pub use image::*;
pub use plan::*;
pub use service::*;
