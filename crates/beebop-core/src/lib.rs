//! beebop-deploy のスタックモデル
//!
//! 設定 ([`beebop_config::BeebopConfig`]) から5つのサービス記述子を組み立て、
//! コンテナランタイムに渡す [`StackPlan`] を生成します。

pub mod composer;
pub mod error;
pub mod model;

pub use composer::*;
pub use error::*;
pub use model::*;
