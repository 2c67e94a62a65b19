//! Scenario runner
//!
//! Loads a scenario file, drives Chrome with the Anthropic reasoner until the
//! task is answered, and prints the validated output as JSON. A failed run
//! prints its report to stderr and exits with status 1.

use anyhow::Context;
use browser_agent::page::ConnectionOptions;
use browser_agent::{
    ActionRegistry, Agent, AgentConfig, AnthropicConfig, AnthropicReasoner, ChromeDriver, LaunchOptions, Scenario,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scenario-runner")]
#[command(version)]
#[command(about = "Run an LLM-driven browser scenario and validate its answer", long_about = None)]
struct Cli {
    /// Scenario file (JSON)
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Launch browser in headed mode (default: headless, always headless when CI is set)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<PathBuf>,

    /// WebSocket endpoint URL for remote browser connection
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,

    /// Maximum number of agent steps
    #[arg(long, env = "AGENT_MAX_STEPS")]
    max_steps: Option<usize>,

    /// Time budget in seconds
    #[arg(long, env = "AGENT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Send a screenshot with every step
    #[arg(long)]
    vision: bool,

    /// Write an animated GIF of the run
    #[arg(long, value_name = "PATH")]
    record_gif: Option<PathBuf>,

    /// Anthropic model to use
    #[arg(long, env = "ANTHROPIC_MODEL")]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let scenario = Scenario::load(&cli.scenario)?;
    let config = AgentConfig::from_env()?;
    let headless = if cli.headed { config.ci } else { config.headless };

    let driver = match &cli.ws_endpoint {
        Some(ws) => ChromeDriver::connect(ConnectionOptions::new(ws.as_str()))?,
        None => {
            let mut options = LaunchOptions::new().headless(headless);
            if let Some(path) = &cli.executable_path {
                options = options.chrome_path(path);
            }
            if let Some(dir) = &cli.user_data_dir {
                options = options.user_data_dir(dir);
            }
            ChromeDriver::launch(options).context("Failed to launch Chrome")?
        }
    };

    let mut anthropic = AnthropicConfig::from_env()?;
    if let Some(model) = cli.model {
        anthropic = anthropic.with_model(model);
    }
    let reasoner = AnthropicReasoner::new(anthropic)?;

    let mut run_config = config.run_config().use_vision(cli.vision);
    if let Some(steps) = cli.max_steps {
        run_config = run_config.max_steps(steps);
    }
    if let Some(secs) = cli.timeout_secs {
        run_config = run_config.max_duration(Duration::from_secs(secs));
    }
    if let Some(path) = cli.record_gif {
        run_config = run_config.record_gif(path);
    }

    let registry = ActionRegistry::with_defaults();
    let setup = scenario.setup(&config)?;

    eprintln!("Running scenario: {}", scenario.task);
    eprintln!("Browser mode: {}", if headless { "headless" } else { "headed" });

    let outcome = Agent::new(&registry, &driver, &reasoner)
        .with_config(run_config)
        .run(&scenario.task, &setup, &scenario.expected_output)
        .await;

    match outcome {
        Ok(success) => {
            println!("{}", serde_json::to_string_pretty(&success.output)?);
            eprintln!("Completed in {} step(s)", success.steps_taken);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprint!("{}", failure.report());
            Ok(ExitCode::FAILURE)
        }
    }
}
