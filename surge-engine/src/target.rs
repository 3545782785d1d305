use reqwest::{Client, StatusCode};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::TargetConfig;
use crate::error::{Result, StressError};

const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the service under test: build, launch, readiness
#[derive(Debug)]
pub struct TargetService {
    config: TargetConfig,
    client: Client,
    child: Option<Child>,
}

impl TargetService {
    pub fn new(config: TargetConfig) -> Result<Self> {
        let client = Client::builder().timeout(READINESS_TIMEOUT).build()?;
        Ok(Self {
            config,
            client,
            child: None,
        })
    }

    /// Run the build command to completion; no command means nothing to build
    #[instrument(skip(self))]
    pub async fn build(&self) -> Result<()> {
        let Some(argv) = &self.config.build_command else {
            debug!("No build command configured");
            return Ok(());
        };

        info!(command = %argv.join(" "), "Building target service");
        let status = command(argv)?
            .status()
            .await
            .map_err(|e| StressError::Setup(format!("failed to run build command: {}", e)))?;

        if !status.success() {
            return Err(StressError::Setup(format!(
                "build command exited with {}",
                status
            )));
        }
        info!("Target service built");
        Ok(())
    }

    /// Spawn the start command; the process is killed when this service is dropped
    pub fn start(&mut self) -> Result<()> {
        let Some(argv) = &self.config.start_command else {
            debug!("No start command configured, expecting an externally managed target");
            return Ok(());
        };
        if self.child.is_some() {
            return Err(StressError::InvalidState(
                "target service already started".to_string(),
            ));
        }

        let child = command(argv)?
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StressError::Setup(format!("failed to start target service: {}", e)))?;

        info!(pid = child.id(), command = %argv.join(" "), "Target service started");
        self.child = Some(child);
        Ok(())
    }

    /// Poll the base URL until it answers `200 OK` or the startup window closes
    #[instrument(skip(self), fields(url = %self.config.base_url))]
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let interval = Duration::from_millis(self.config.readiness_poll_interval_ms);
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(StressError::Setup(format!(
                        "target service exited early with {}",
                        status
                    )));
                }
            }

            match self.client.get(&self.config.base_url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    info!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Target service is ready"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    debug!(status = response.status().as_u16(), "Target not ready yet");
                }
                Err(e) => {
                    debug!(error = %e, "Target not reachable yet");
                }
            }

            if Instant::now() + interval > deadline {
                warn!(
                    timeout_secs = self.config.startup_timeout_secs,
                    "Target service did not become ready"
                );
                return Err(StressError::StartupTimeout {
                    url: self.config.base_url.clone(),
                    waited_secs: self.config.startup_timeout_secs,
                });
            }
            sleep(interval).await;
        }
    }

    /// Kill the launched process, if any
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child.kill().await?;
            info!("Target service stopped");
        }
        Ok(())
    }
}

fn command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| StressError::Config("command cannot be empty".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin;

    fn target(base_url: &str) -> TargetConfig {
        TargetConfig {
            base_url: base_url.to_string(),
            startup_timeout_secs: 1,
            readiness_poll_interval_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_build_command_is_noop() {
        let service = TargetService::new(target("http://127.0.0.1:1")).unwrap();
        service.build().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_build_is_setup_error() {
        let mut config = target("http://127.0.0.1:1");
        config.build_command = Some(vec!["false".to_string()]);
        let service = TargetService::new(config).unwrap();
        assert!(matches!(service.build().await, Err(StressError::Setup(_))));
    }

    #[tokio::test]
    async fn test_successful_build() {
        let mut config = target("http://127.0.0.1:1");
        config.build_command = Some(vec!["true".to_string()]);
        let service = TargetService::new(config).unwrap();
        service.build().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let mut config = target("http://127.0.0.1:1");
        config.start_command = Some(Vec::new());
        let mut service = TargetService::new(config).unwrap();
        assert!(matches!(service.start(), Err(StressError::Config(_))));
    }

    #[tokio::test]
    async fn test_ready_against_live_origin() {
        let (addr, _handle) = origin::spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut service = TargetService::new(target(&format!("http://{}", addr))).unwrap();
        service.wait_until_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_timeout() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut service = TargetService::new(target(&format!("http://127.0.0.1:{}", port))).unwrap();

        match service.wait_until_ready().await {
            Err(StressError::StartupTimeout { waited_secs, .. }) => assert_eq!(waited_secs, 1),
            other => panic!("expected startup timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_exit_detected() {
        let mut config = target("http://127.0.0.1:1");
        config.start_command = Some(vec!["true".to_string()]);
        config.startup_timeout_secs = 5;
        let mut service = TargetService::new(config).unwrap();
        service.start().unwrap();
        sleep(Duration::from_millis(200)).await;

        assert!(matches!(
            service.wait_until_ready().await,
            Err(StressError::Setup(_))
        ));
    }
}
