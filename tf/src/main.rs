//! tf - TaskForce command-line entry point

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tracing_subscriber::EnvFilter;

use taskforce::cli::{Cli, Command};
use taskforce::llm::OpenAiCompatClient;
use taskforce::{Config, RunId, RunStatus, Runtime, Task};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;
    let runtime = build_runtime(&config)?;

    match cli.command {
        Command::Submit {
            prompt,
            specialist,
            tier,
            network,
        } => {
            let mut task = Task::new(prompt);
            task.model_tier = tier;
            task.network_allowed = network;
            task.specialist = specialist;

            let outcome = runtime.submit(task).await?;
            println!("run: {}", outcome.run_id);
            println!("{}", serde_json::to_string_pretty(&outcome.payload)?);
        }
        Command::Resume { run_id } => {
            let outcome = runtime.resume(&RunId::from_string(run_id)).await?;
            println!("run: {}", outcome.run_id);
            println!("{}", serde_json::to_string_pretty(&outcome.payload)?);
        }
        Command::Runs => {
            let resumable = runtime.list_resumable()?;
            if resumable.is_empty() {
                println!("no resumable runs");
            }
            for checkpoint in resumable {
                println!(
                    "{}  completed=[{}]  {}",
                    checkpoint.run_id,
                    checkpoint.completed_specialist_ids.join(", "),
                    checkpoint.task.prompt.chars().take(60).collect::<String>(),
                );
            }
        }
        Command::Status { run_id } => {
            let status = match runtime.status(&RunId::from_string(run_id)) {
                RunStatus::Completed => "completed",
                RunStatus::Running => "running",
                RunStatus::NotFound => "not_found",
            };
            println!("{}", status);
        }
    }

    Ok(())
}

fn build_runtime(config: &Config) -> Result<Runtime> {
    let default_model = config.model_for_tier("fast");
    let local = Arc::new(OpenAiCompatClient::new(
        &config.llm.base_url,
        &default_model,
        config.llm.api_key_env.as_deref(),
        config.llm.timeout_ms,
    )?);

    let mut runtime = Runtime::new(config.clone(), local);
    if config.fallback.policy != taskforce::FallbackPolicyConfig::Off {
        let cloud = Arc::new(OpenAiCompatClient::new(
            &config.fallback.cloud_base_url,
            &config.fallback.cloud_model,
            config.fallback.cloud_api_key_env.as_deref(),
            config.llm.timeout_ms,
        )?);
        runtime = runtime.with_cloud_chat(cloud);
    }
    Ok(runtime)
}
