//! Launching a local chromedriver/geckodriver

use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{DriverError, DriverResult};
use crate::webdriver::Browser;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// A driver executable we started; stopped on drop.
pub struct DriverProcess {
    child: Child,
    base_url: String,
}

impl DriverProcess {
    /// Start `binary` on a free local port and wait until it reports ready.
    pub async fn spawn(binary: &Path, browser: Browser) -> DriverResult<Self> {
        let port = find_free_port()?;
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", binary.display(), port);

        let mut cmd = Command::new(binary);
        match browser {
            Browser::Chrome => cmd.arg(format!("--port={}", port)),
            Browser::Firefox => cmd.args(["--port", &port.to_string()]),
        };
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            DriverError::Startup(format!("Failed to spawn {}: {}", binary.display(), e))
        })?;

        let process = DriverProcess { child, base_url };
        process.wait_until_ready(STARTUP_TIMEOUT).await?;

        info!("Driver is ready at {}", process.base_url);
        Ok(process)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Poll `/status` until the driver says `ready`.
    async fn wait_until_ready(&self, timeout: Duration) -> DriverResult<()> {
        let status_url = format!("{}/status", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;
        while start.elapsed() < timeout {
            attempts += 1;
            match client.get(&status_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await?;
                    if body["value"]["ready"].as_bool().unwrap_or(false) {
                        return Ok(());
                    }
                }
                Ok(resp) => warn!("Driver status returned {}", resp.status()),
                Err(e) if !e.is_connect() => warn!("Driver status error: {}", e),
                Err(_) => {}
            }
            sleep(Duration::from_millis(100)).await;
        }

        Err(DriverError::Startup(format!(
            "driver at {} not ready after {} attempts",
            self.base_url, attempts
        )))
    }

    fn stop(&mut self) {
        info!("Stopping driver (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn find_free_port() -> DriverResult<u16> {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|e| DriverError::Startup(format!("no free local port: {}", e)))
}
