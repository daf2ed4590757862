//! 命令执行器
//!
//! 提供统一的外部进程执行接口，支持：
//! - stdout/stderr 完整捕获
//! - 超时控制（超时后终止子进程）

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::error;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout(d) => write!(f, "Command timed out after {:?}", d),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) => Some(e),
            CommandError::Timeout(_) => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug)]
pub struct CommandOutput {
    /// 退出状态
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// 退出码（被信号终止时为 None）
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

impl CommandRunner {
    /// 执行命令并捕获全部输出
    ///
    /// 子进程随返回的 future 一起释放：调用方在外层施加超时或取消时，
    /// 进程会被终止
    pub async fn run_captured(
        program: &str,
        args: &[String],
        envs: &[(String, String)],
    ) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(CommandError::SpawnFailed)?;

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// 执行命令，超时后终止
    pub async fn run_with_timeout(
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        match tokio::time::timeout(timeout, Self::run_captured(program, args, envs)).await {
            Ok(result) => result,
            Err(_) => {
                error!(program, "Command timed out after {:?}", timeout);
                Err(CommandError::Timeout(timeout))
            }
        }
    }
}
