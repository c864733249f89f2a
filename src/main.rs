use clap::Parser;

use crawler_entrypoint::Config;

#[derive(Parser)]
#[command(
    version,
    about = "Container entrypoint for the crawler/LLM pipeline: optionally opens an SSH tunnel, then runs the given command"
)]
struct EntrypointCli {
    /// Command to run after setup; defaults to the pipeline crawler
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn default_command() -> Vec<String> {
    vec!["python".to_string(), "crawl_with_llm.py".to_string()]
}

#[tokio::main]
async fn main() {
    let cli = EntrypointCli::parse();
    let command = if cli.command.is_empty() {
        default_command()
    } else {
        cli.command
    };

    match crawler_entrypoint::run(Config::from_env(), command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("entrypoint error: {e}");
            std::process::exit(1);
        }
    }
}
