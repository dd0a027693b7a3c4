//! Loopgate binary entry point.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use loopgate::agent::ChatAgent;
use loopgate::agent_loop::StreamEvent;
use loopgate::cli::{ChatArgs, Cli, Commands, Overrides, ServeArgs};
use loopgate::config::LoopConfig;
use loopgate::tools::builtin;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loopgate=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LoopConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Serve(args) => handle_serve(config, args).await,
        Commands::Chat(args) => handle_chat(config, args).await,
        Commands::Tools(overrides) => handle_tools(config, &overrides),
    }
}

async fn handle_serve(mut config: LoopConfig, args: ServeArgs) -> anyhow::Result<()> {
    args.overrides.apply(&mut config)?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    loopgate::server::serve(config).await?;
    Ok(())
}

async fn handle_chat(mut config: LoopConfig, args: ChatArgs) -> anyhow::Result<()> {
    let Some(prompt) = args.prompt else {
        bail!("usage: loopgate chat \"your prompt here\"");
    };
    args.overrides.apply(&mut config)?;
    if let Some(system) = args.system {
        config.system_prompt = system;
    }

    let agent = Arc::new(ChatAgent::from_config(&config)?);
    let conversation = agent.store().create_conversation(None).await?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut events = agent.initiate(conversation.id, prompt);

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Content { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::ToolResult(result) => {
                let marker = if result.success { "ok" } else { "failed" };
                let detail = result.error.unwrap_or_else(|| result.output.to_string());
                eprintln!("\n[{}: {marker}] {}", result.name, preview(&detail, 200));
            }
            StreamEvent::ToolApproval(request) => {
                eprintln!("\n{}", request.reason);
                eprintln!("input: {}", request.tool_input);
                eprint!("Run it? [y/N] ");
                let answer = stdin.next_line().await?.unwrap_or_default();
                let approved = matches!(answer.trim(), "y" | "Y" | "yes");
                events = agent.resume(request.id, approved);
            }
            StreamEvent::Warning { text } => eprintln!("\nwarning: {text}"),
            StreamEvent::MessageSaved { .. } => {}
            StreamEvent::Done { .. } => {
                println!();
                break;
            }
            StreamEvent::Error { text } => bail!(text),
        }
    }
    Ok(())
}

fn handle_tools(mut config: LoopConfig, overrides: &Overrides) -> anyhow::Result<()> {
    overrides.apply(&mut config)?;
    let registry = builtin::default_registry(&config.workspace_root)?;
    for tool in registry.all() {
        let risk = tool.risk_level();
        let gate = if risk.requires_approval() {
            "approval"
        } else {
            "auto"
        };
        println!(
            "{:<12} risk {} ({risk}, {gate})  {}",
            tool.name(),
            risk.level(),
            tool.description()
        );
    }
    Ok(())
}

fn preview(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
