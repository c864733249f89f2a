pub mod config;
pub mod ssh_args;
pub mod supervisor;
pub mod tunnel;

use std::io;

pub use config::Config;

pub async fn run(config: Config, command: Vec<String>) -> io::Result<i32> {
    supervisor::run(config, command).await
}
