use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use codeloop_agent::{Agent, AgentConfig, AgentEvent, StdinInput};
use codeloop_core::config::Config;
use codeloop_providers::OpenAiCompatible;
use codeloop_tools::{ToolContext, ToolRegistry};

mod logging;
mod render;

use render::Renderer;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "Coding agent for a local OpenAI-compatible model server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent on stdin
    Chat {
        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Chat-completions endpoint URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Context window budget in tokens
        #[arg(long)]
        context_window: Option<usize>,

        /// Workspace directory the tools operate in
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Print the tool schemas advertised to the model
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    logging::init_logging(&config.logging.clone().unwrap_or_default(), cli.verbose)?;
    tracing::debug!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Chat {
            model,
            endpoint,
            context_window,
            workspace,
        } => {
            run_chat(&config, model, endpoint, context_window, workspace).await?;
        }
        Commands::Tools => {
            let tools = ToolRegistry::with_builtin(&config)?;
            let json = serde_json::to_string_pretty(&tools.describe())?;
            println!("{json}");
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = config.clone();
                if let Some(model) = shown.model.as_mut() {
                    if model.api_key.is_some() {
                        model.api_key = Some("********".into());
                    }
                }
                let json = serde_json::to_string_pretty(&shown)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}

async fn run_chat(
    config: &Config,
    model: Option<String>,
    endpoint: Option<String>,
    context_window: Option<usize>,
    workspace: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut agent_config = AgentConfig::from_config(config);
    if let Some(model) = model {
        agent_config.model = model;
    }
    if let Some(window) = context_window {
        agent_config.context_window = window;
    }

    let mut context = ToolContext::from_config(config);
    if let Some(workspace) = workspace {
        context.workspace = workspace;
    }

    let url = endpoint.unwrap_or_else(|| config.endpoint_url());
    let client = OpenAiCompatible::new(&url).with_api_key(config.api_key());
    let tools = ToolRegistry::with_builtin(config)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<AgentEvent>();
    let color = std::io::stdout().is_terminal();
    let renderer = tokio::spawn(async move {
        let mut renderer = Renderer::new(std::io::stdout(), color);
        while let Some(event) = rx.recv().await {
            if let Err(e) = renderer.render(&event) {
                tracing::warn!(%e, "Failed to write to terminal");
                break;
            }
        }
    });

    let mut agent = Agent::new(agent_config, Arc::new(client), tools, context, tx);
    let mut input = StdinInput::new();
    let summary = agent.run(&mut input).await?;

    // Dropping the agent closes the event channel and lets the renderer drain.
    drop(agent);
    renderer.await?;

    eprintln!(
        "\n{} turns, {} model calls, {} tool calls, {} evictions, {} errors",
        summary.user_turns,
        summary.model_calls,
        summary.tool_calls,
        summary.evictions,
        summary.transport_errors
    );
    Ok(())
}
