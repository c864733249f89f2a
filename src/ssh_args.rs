use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

fn expand_tilde_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

// Build the ssh command line for the local-forward tunnel.
// The container is non-interactive: no prompts can ever be answered, so
// BatchMode is on and host keys are accepted without persistence.
pub fn build_invocation(config: &Config) -> Result<Invocation, String> {
    let mut ssh_args: Vec<String> = Vec::new();

    // Port-forward only; never run a remote command
    ssh_args.push("-N".to_string());
    // Exit immediately if the forwarding request is rejected, so startup
    // failure is observable instead of silently degrading
    ssh_args.push("-o".to_string());
    ssh_args.push("ExitOnForwardFailure=yes".to_string());
    // Never block on a prompt inside the container
    ssh_args.push("-o".to_string());
    ssh_args.push("BatchMode=yes".to_string());
    ssh_args.push("-o".to_string());
    ssh_args.push("StrictHostKeyChecking=no".to_string());
    ssh_args.push("-o".to_string());
    ssh_args.push("UserKnownHostsFile=/dev/null".to_string());
    // KeepAlive: detect dead connections and exit promptly
    ssh_args.push("-o".to_string());
    ssh_args.push("ServerAliveInterval=60".to_string());
    ssh_args.push("-o".to_string());
    ssh_args.push("ServerAliveCountMax=3".to_string());
    // Bounded connect so an unreachable host fails instead of hanging
    ssh_args.push("-o".to_string());
    ssh_args.push("ConnectTimeout=10".to_string());

    let forward_spec = format!("{}:localhost:{}", config.local_port, config.remote_port);
    ssh_args.push("-L".to_string());
    ssh_args.push(forward_spec);

    ssh_args.push("-p".to_string());
    ssh_args.push(config.ssh_port.to_string());

    if let Some(key_path) = &config.ssh_key_path {
        let kp = expand_tilde_path(key_path);
        if !kp.exists() {
            return Err(format!("SSH key not found: {}", kp.display()));
        }
        ssh_args.push("-i".to_string());
        ssh_args.push(kp.to_string_lossy().to_string());
    }

    // Target
    ssh_args.push(format!("{}@{}", config.ssh_user, config.ssh_host));

    Ok(Invocation {
        program: "ssh".to_string(),
        args: ssh_args,
    })
}
