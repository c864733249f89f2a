use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::time::{timeout, Duration};

use crate::config::Config;
use crate::ssh_args::{build_invocation, Invocation};
use crate::tunnel::TunnelProcess;

// How long the main process gets to handle a forwarded signal before it is
// killed outright.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Run the entrypoint: optional tunnel startup, then hand control to the
/// pipeline command and propagate its exit code. The tunnel, when started, is
/// torn down on every exit path before this function returns.
pub async fn run(config: Config, command: Vec<String>) -> io::Result<i32> {
    run_inner(config, command, None).await
}

// The tunnel invocation is injectable so tests can stand in a fake
// long-lived process for ssh.
async fn run_inner(
    config: Config,
    command: Vec<String>,
    tunnel_invocation: Option<Invocation>,
) -> io::Result<i32> {
    println!("Starting crawler pipeline container");

    // Install the signal streams before anything is spawned, so a TERM
    // arriving during tunnel startup is held for the handoff wait instead of
    // killing the supervisor with the tunnel still running.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    if config.github_token.is_none() {
        println!("Warning: GITHUB_TOKEN is not set; unauthenticated GitHub API rate limits apply");
        println!("         set it with: export GITHUB_TOKEN=your_token");
    }

    let mut tunnel: Option<TunnelProcess> = None;
    if config.tunnel_enabled {
        println!("SSH tunnel configuration:");
        println!("  Host: {}", config.ssh_host);
        println!("  Port: {}", config.ssh_port);
        println!("  User: {}", config.ssh_user);
        println!("  Local Port: {}", config.local_port);
        println!("  Remote Port: {}", config.remote_port);

        let inv = match tunnel_invocation {
            Some(inv) => inv,
            None => match build_invocation(&config) {
                Ok(inv) => inv,
                Err(e) => {
                    eprintln!("SSH tunnel configuration error: {e}");
                    return Ok(1);
                }
            },
        };
        match TunnelProcess::start(&inv, config.local_port).await {
            Ok(t) => {
                println!("SSH tunnel started (localhost:{})", config.local_port);
                tunnel = Some(t);
            }
            Err(e) => {
                eprintln!("Failed to start SSH tunnel: {e}");
                return Ok(1);
            }
        }
    }

    let code = run_command(&command, &mut sigterm, &mut sigint).await;

    if let Some(mut t) = tunnel {
        println!("Stopping SSH tunnel");
        t.terminate().await;
    }

    code
}

// Spawn the main command with inherited stdio and environment, wait for it,
// and propagate its status. A true exec would leave nobody to stop the
// tunnel, so the command runs as a supervised child instead.
async fn run_command(
    command: &[String],
    sigterm: &mut Signal,
    sigint: &mut Signal,
) -> io::Result<i32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    println!("Starting main process: {}", command.join(" "));

    let mut child = Command::new(program).args(args).spawn()?;

    tokio::select! {
        status = child.wait() => Ok(exit_status_code(status?)),
        _ = sigterm.recv() => Ok(shutdown_child(&mut child, SignalKind::terminate()).await),
        _ = sigint.recv() => Ok(shutdown_child(&mut child, SignalKind::interrupt()).await),
    }
}

// Forward the received signal so the pipeline can run its own cleanup
// (flush output, close files); escalate to a hard kill only if it has not
// exited within the grace period. Returns the conventional 128+signo status.
async fn shutdown_child(child: &mut Child, kind: SignalKind) -> i32 {
    let signo = kind.as_raw_value();
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, signo);
        }
    }
    if timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
    128 + signo
}

fn exit_status_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    fn no_tunnel_config() -> Config {
        Config::from_lookup(|_| None)
    }

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn marker_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("entrypoint-{tag}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn handoff_without_tunnel_propagates_success() {
        let code = run(no_tunnel_config(), command(&["sh", "-c", "exit 0"]))
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn handoff_propagates_nonzero_exit() {
        let code = run(no_tunnel_config(), command(&["sh", "-c", "exit 7"]))
            .await
            .unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn missing_token_does_not_change_exit_status() {
        let mut config = no_tunnel_config();
        assert!(config.github_token.is_none());
        let without = run(config.clone(), command(&["sh", "-c", "exit 0"]))
            .await
            .unwrap();
        config.github_token = Some("ghp_xxx".to_string());
        let with = run(config, command(&["sh", "-c", "exit 0"])).await.unwrap();
        assert_eq!(without, with);
    }

    #[tokio::test]
    async fn tunnel_config_error_aborts_before_handoff() {
        let marker = marker_path("bad-key");
        let mut config = no_tunnel_config();
        config.tunnel_enabled = true;
        config.ssh_key_path = Some("/nonexistent/id_rsa".to_string());

        let code = run(
            config,
            command(&["sh", "-c", &format!("touch {}", marker.display())]),
        )
        .await
        .unwrap();

        assert_eq!(code, 1);
        assert!(!marker.exists(), "command must never run after tunnel failure");
    }

    #[tokio::test]
    async fn tunnel_is_torn_down_when_run_returns() {
        // Stand-in for the forwarded port so tunnel startup reports ready.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Fake tunnel records its pid, then lives until killed.
        let pid_file = marker_path("tunnel-pid");
        let inv = Invocation {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo $$ > {}; exec sleep 30", pid_file.display()),
            ],
        };
        let mut config = no_tunnel_config();
        config.tunnel_enabled = true;
        config.local_port = port;

        let code = run_inner(config, command(&["sh", "-c", "sleep 0.2"]), Some(inv))
            .await
            .unwrap();
        assert_eq!(code, 0);

        let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(
            unsafe { libc::kill(pid, 0) },
            -1,
            "tunnel process must be gone by the time run returns"
        );
        std::fs::remove_file(&pid_file).ok();
    }

    #[tokio::test]
    async fn forwarded_term_lets_the_child_clean_up() {
        let marker = marker_path("term-trap");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(format!(
                "trap 'touch {}; exit 0' TERM; sleep 30 & wait",
                marker.display()
            ))
            .spawn()
            .unwrap();
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let code = shutdown_child(&mut child, SignalKind::terminate()).await;

        assert_eq!(code, 143);
        assert!(
            marker.exists(),
            "child must see SIGTERM and run its own cleanup"
        );
        std::fs::remove_file(&marker).ok();
    }

    #[tokio::test]
    async fn empty_command_is_an_error() {
        assert!(run(no_tunnel_config(), vec![]).await.is_err());
    }

    #[tokio::test]
    async fn missing_program_surfaces_spawn_error() {
        assert!(run(no_tunnel_config(), command(&["/nonexistent/pipeline"]))
            .await
            .is_err());
    }

    #[test]
    fn signal_deaths_map_to_128_plus_signo() {
        let status = ExitStatus::from_raw(15); // killed by SIGTERM
        assert_eq!(exit_status_code(status), 143);
        let status = ExitStatus::from_raw(7 << 8); // exited with 7
        assert_eq!(exit_status_code(status), 7);
    }
}
