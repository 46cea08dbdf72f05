//! OS 프로세스 실행기.
//!
//! unix에서는 자식을 새 프로세스 그룹으로 실행하고 종료할 때 그룹 전체에 신호를 보냅니다.
//! 수집 명령이 래퍼(`sh -c`, `cargo run` 등)여도 실제 수집 프로세스까지 함께 종료됩니다.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use trader_core::heartbeat::LAUNCH_ID_ENV;
use uuid::Uuid;

use crate::error::WatchdogError;
use crate::supervisor::{ChildExit, ChildProcess, Launcher};
use crate::Result;

/// 수집 명령을 자식 프로세스로 실행합니다.
///
/// 자식의 표준 출력/에러는 그대로 상속되어 감시 프로세스 콘솔에 함께 출력됩니다.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    heartbeat_path: PathBuf,
}

impl ProcessLauncher {
    /// `command`의 첫 항목이 실행 파일, 나머지는 인자입니다.
    pub fn new(command: &[String], heartbeat_path: impl Into<PathBuf>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| WatchdogError::Config("실행할 수집 명령이 없습니다".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            heartbeat_path: heartbeat_path.into(),
        })
    }
}

impl Launcher for ProcessLauncher {
    type Child = ProcessChild;

    fn launch(&mut self) -> Result<ProcessChild> {
        let launch_id = Uuid::new_v4().to_string();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("HEARTBEAT_PATH", &self.heartbeat_path)
            .env(LAUNCH_ID_ENV, &launch_id)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| WatchdogError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // process_group(0): 그룹 ID는 자식 pid
        let process_group = if cfg!(unix) { child.id() } else { None };
        Ok(ProcessChild {
            inner: child,
            launch_id,
            process_group,
        })
    }
}

/// 실행 중인 수집 프로세스
#[derive(Debug)]
pub struct ProcessChild {
    inner: Child,
    launch_id: String,
    process_group: Option<u32>,
}

#[async_trait]
impl ChildProcess for ProcessChild {
    fn id(&self) -> Option<u32> {
        self.inner.id()
    }

    fn launch_id(&self) -> &str {
        &self.launch_id
    }

    async fn wait(&mut self) -> std::io::Result<ChildExit> {
        self.inner.wait().await.map(ChildExit::from)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        kill_group(self.process_group).await;
        // 이미 종료된 프로세스는 회수만
        if self.inner.try_wait()?.is_some() {
            return Ok(());
        }
        self.inner.kill().await
    }

    async fn cleanup(&mut self) -> std::io::Result<()> {
        kill_group(self.process_group).await;
        Ok(())
    }
}

#[cfg(not(unix))]
async fn kill_group(_process_group: Option<u32>) {}

/// 프로세스 그룹 전체에 SIGKILL.
///
/// 그룹에 남은 프로세스가 없으면 `kill`이 실패하며, 이는 정상입니다.
#[cfg(unix)]
async fn kill_group(process_group: Option<u32>) {
    let Some(pgid) = process_group else {
        return;
    };

    let status = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{}", pgid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            tracing::debug!(pgid, "프로세스 그룹 종료");
        }
        Ok(_) => tracing::debug!(pgid, "종료할 프로세스 그룹 없음"),
        Err(e) => tracing::warn!(pgid, error = %e, "프로세스 그룹 종료 실패"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn sh_launcher(script: &str, dir: &Path) -> ProcessLauncher {
        ProcessLauncher::new(&sh(script), dir.join("hb.json")).unwrap()
    }

    /// 0.1초마다 `ticks` 파일에 한 줄씩 추가하는 셸 루프
    fn ticker(ticks: &Path) -> String {
        format!("while :; do echo x >> '{}'; sleep 0.1; done", ticks.display())
    }

    fn tick_count(ticks: &Path) -> usize {
        std::fs::read_to_string(ticks)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    async fn wait_for_ticks(ticks: &Path) {
        for _ in 0..50 {
            if tick_count(ticks) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("하위 프로세스가 시작되지 않음");
    }

    /// 종료된 하위 프로세스는 더 이상 기록하지 않음
    async fn assert_ticks_stopped(ticks: &Path) {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = tick_count(ticks);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(tick_count(ticks), before, "하위 프로세스가 살아 있음");
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = sh_launcher("exit 2", dir.path());
        let mut child = launcher.launch().unwrap();

        assert_eq!(child.wait().await.unwrap(), ChildExit::Failed { code: Some(2) });
        // 종료된 프로세스에 대한 kill은 에러가 아님
        assert!(child.kill().await.is_ok());
    }

    #[tokio::test]
    async fn test_heartbeat_env_passed_to_child() {
        let dir = tempfile::tempdir().unwrap();
        let hb = dir.path().join("hb.json");
        let marker = dir.path().join("marker");
        let script = format!(
            "printf '%s\\n%s' \"$HEARTBEAT_PATH\" \"${}\" > '{}'",
            LAUNCH_ID_ENV,
            marker.display()
        );
        let mut launcher = ProcessLauncher::new(&sh(&script), &hb).unwrap();

        let mut child = launcher.launch().unwrap();
        assert_eq!(child.wait().await.unwrap(), ChildExit::Success);

        let written = std::fs::read_to_string(marker).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        let expected_path = hb.display().to_string();
        assert_eq!(lines, vec![expected_path.as_str(), child.launch_id()]);
    }

    #[tokio::test]
    async fn test_launch_ids_differ_per_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = sh_launcher("exit 0", dir.path());

        let mut first = launcher.launch().unwrap();
        let mut second = launcher.launch().unwrap();
        assert_ne!(first.launch_id(), second.launch_id());
        first.wait().await.unwrap();
        second.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_kill_stops_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = sh_launcher("sleep 30", dir.path());
        let mut child = launcher.launch().unwrap();

        child.kill().await.unwrap();
        assert!(child.inner.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_kill_reaches_process_behind_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let ticks = dir.path().join("ticks");
        // 안쪽 셸이 실제 작업, 바깥 셸은 exec 없이 기다리는 래퍼
        let script = format!("sh -c \"{}\"; exit 0", ticker(&ticks));
        let mut launcher = sh_launcher(&script, dir.path());
        let mut child = launcher.launch().unwrap();
        wait_for_ticks(&ticks).await;

        child.kill().await.unwrap();

        assert!(child.inner.try_wait().unwrap().is_some());
        assert_ticks_stopped(&ticks).await;
    }

    #[tokio::test]
    async fn test_cleanup_after_wrapper_exit() {
        let dir = tempfile::tempdir().unwrap();
        let ticks = dir.path().join("ticks");
        // 래퍼는 하위 프로세스를 남겨 두고 먼저 종료
        let script = format!("({}) & sleep 0.3; exit 3", ticker(&ticks));
        let mut launcher = sh_launcher(&script, dir.path());
        let mut child = launcher.launch().unwrap();

        assert_eq!(child.wait().await.unwrap(), ChildExit::Failed { code: Some(3) });
        wait_for_ticks(&ticks).await;

        child.cleanup().await.unwrap();
        assert_ticks_stopped(&ticks).await;
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(ProcessLauncher::new(&[], "hb.json").is_err());
    }
}
