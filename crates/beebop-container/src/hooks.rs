//! 起動後フックの実行
//!
//! 各フックはコンテナの作成・起動直後に一度だけ実行され、
//! 失敗すると `start` 全体が中断されます（ロールバックはしません）。

use crate::converter::download_spec;
use crate::error::HookError;
use crate::runtime::ContainerRuntime;
use crate::waiter::{WaitConfig, wait_until};
use beebop_core::{
    Hook, SERVER_CONFIG_PATH, ServiceDescriptor, StackPlan, certificate_paths,
    redis_ping_command, self_signed_command,
};
use tracing::{debug, info};

type Result<T> = std::result::Result<T, HookError>;

/// フックを実行
pub async fn run_hook<R: ContainerRuntime>(
    runtime: &R,
    plan: &StackPlan,
    service: &ServiceDescriptor,
    container: &str,
    hook: &Hook,
    wait: &WaitConfig,
) -> Result<()> {
    info!(service = service.name(), hook = hook.name(), "Running hook");

    match hook {
        Hook::WaitForRedis => wait_for_redis(runtime, container, wait).await,
        Hook::DownloadDatabases { references_only } => {
            let spec = download_spec(plan, service, *references_only)?;
            let output = runtime.run_once(&spec).await?;
            if !output.success() {
                return Err(HookError::DownloadFailed {
                    exit_code: output.exit_code,
                    output: output.output,
                });
            }
            Ok(())
        }
        Hook::WriteServerConfig { document } => {
            let content = serde_json::to_vec_pretty(document)?;
            runtime
                .put_file(container, SERVER_CONFIG_PATH, &content)
                .await?;
            Ok(())
        }
        Hook::InstallCertificates { certificate, key } => {
            let (cert_path, key_path) = certificate_paths();
            runtime
                .put_file(container, &cert_path, certificate.as_bytes())
                .await?;
            runtime.put_file(container, &key_path, key.as_bytes()).await?;
            Ok(())
        }
        Hook::GenerateSelfSigned { host } => {
            exec_checked(runtime, container, &self_signed_command(host)).await
        }
    }
}

async fn wait_for_redis<R: ContainerRuntime>(
    runtime: &R,
    container: &str,
    wait: &WaitConfig,
) -> Result<()> {
    let cmd = redis_ping_command();
    let cmd = &cmd;
    wait_until(container, wait, move || async move {
        let output = runtime.exec(container, cmd).await?;
        Ok::<_, crate::ContainerError>(output.success() && output.output.trim() == "PONG")
    })
    .await
    .map(|attempts| debug!(container, attempts, "Redis is ready"))
    .map_err(|attempts| HookError::Timeout {
        container: container.to_string(),
        attempts,
    })
}

async fn exec_checked<R: ContainerRuntime>(
    runtime: &R,
    container: &str,
    cmd: &[String],
) -> Result<()> {
    let output = runtime.exec(container, cmd).await?;
    if !output.success() {
        return Err(HookError::CommandFailed {
            container: container.to_string(),
            command: cmd.join(" "),
            exit_code: output.exit_code,
            output: output.output,
        });
    }
    Ok(())
}
