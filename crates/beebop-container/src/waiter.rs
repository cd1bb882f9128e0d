//! 準備完了の待機（Exponential Backoff）

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 待機設定
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    /// 最大試行回数
    pub max_retries: u32,
    /// 初期待機時間（ミリ秒）
    pub initial_delay_ms: u64,
    /// 最大待機時間（ミリ秒）
    pub max_delay_ms: u64,
    /// Exponential倍率
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 12,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    /// 待機なしで `max_retries` 回だけ試行する
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// 指定回数目の待機時間を計算（ミリ秒）
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

/// `probe` が true を返すまで待機
///
/// 成功した試行回数を返します。すべての試行が失敗した場合は `Err(試行回数)`。
/// probe のエラーは「まだ準備できていない」として扱います。
pub async fn wait_until<F, Fut, E>(
    target: &str,
    config: &WaitConfig,
    mut probe: F,
) -> std::result::Result<u32, u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<bool, E>>,
    E: std::fmt::Display,
{
    for attempt in 0..config.max_retries {
        match probe().await {
            Ok(true) => {
                tracing::debug!(target = %target, attempts = attempt + 1, "Ready");
                return Ok(attempt + 1);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(target = %target, error = %e, "Probe failed");
            }
        }

        // 最後の試行でなければ待機
        if attempt + 1 < config.max_retries {
            let delay_ms = config.delay_for_attempt(attempt);
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    tracing::warn!(target = %target, attempts = config.max_retries, "Gave up waiting");
    Err(config.max_retries)
}
