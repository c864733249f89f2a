use std::io;
use std::process::Stdio;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration};

use crate::ssh_args::Invocation;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A background tunnel process. The handle is owned exclusively here and the
/// process is signaled to terminate at most once, on `terminate` or drop.
#[derive(Debug)]
pub struct TunnelProcess {
    child: Option<Child>,
}

impl TunnelProcess {
    /// Spawn the tunnel and wait until it is ready.
    ///
    /// Readiness means the local forward port accepts a TCP connection. If
    /// the process exits before that (unreachable host, rejected forward,
    /// failed auth with BatchMode), startup has failed. There is no overall
    /// timeout; a hanging connection attempt is bounded by ssh's own
    /// ConnectTimeout.
    pub async fn start(inv: &Invocation, local_port: u16) -> io::Result<TunnelProcess> {
        let child = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut tunnel = TunnelProcess { child: Some(child) };
        tunnel.wait_ready(local_port).await?;
        Ok(tunnel)
    }

    async fn wait_ready(&mut self, local_port: u16) -> io::Result<()> {
        let child = match self.child.as_mut() {
            Some(c) => c,
            None => return Err(io::Error::new(io::ErrorKind::Other, "tunnel already gone")),
        };
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("tunnel process exited during startup: {status}"),
                ));
            }
            if TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                return Ok(());
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Terminate the tunnel, at most once. Errors are swallowed: the process
    /// may already be gone, and the whole process group is about to exit.
    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

impl Drop for TunnelProcess {
    // Backstop for exit paths that skip terminate(); kill_on_drop covers the
    // inner handle, this just makes the intent explicit.
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
