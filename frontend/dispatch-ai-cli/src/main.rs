mod cli;
mod renderer;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use dispatch_ai_core::config::schema::ModelSlot;
use dispatch_ai_core::{Config, DispatchAI};
use tokio_util::sync::CancellationToken;

use crate::cli::{Command, OutputFormat};
use crate::renderer::Renderer;
use crate::repl::{ConsoleTransport, Repl};

fn main() {
    if let Err(error) = run() {
        eprintln!("dispatch-ai failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> dispatch_ai_core::Result<()> {
    let args = cli::Cli::parse_args();
    let config = dispatch_ai_core::config::load(args.config.as_deref())?;

    let command = args.command.clone().unwrap_or(Command::Chat);
    if let Command::CheckConfig = command {
        dispatch_ai_core::config::validate_config(&config)?;
        print_config_summary(&config, args.output)?;
        return Ok(());
    }

    dispatch_ai_core::logging::init_tracing(&config.logging.level, config.logging.format)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|err| {
        dispatch_ai_core::Error::Config(format!("failed to create tokio runtime: {err}"))
    })?;
    let result = runtime.block_on(serve(args, command, config));
    // A pending console read must not keep the process alive.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn serve(args: cli::Cli, command: Command, config: Config) -> dispatch_ai_core::Result<()> {
    let echo = args.output == OutputFormat::Text && matches!(command, Command::Chat);
    let transport = Arc::new(ConsoleTransport::new(echo));
    let app = Arc::new(DispatchAI::new(config, transport.clone())?);

    let renderer = Renderer::new(args.output);
    let renderer_handle = tokio::spawn(renderer.run(app.events().subscribe()));

    let cancel = CancellationToken::new();
    let sweeper = app.runtime().spawn_sweeper(cancel.child_token());
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; shutting down");
                cancel.cancel();
            }
        })
    };

    let result = match command {
        Command::Ask {
            message,
            command_id,
        } => {
            let turn = repl::inbound(&args.conversation, &args.actor, &command_id, &message);
            transport.record_user(&args.conversation, turn.as_turn());
            let report = tokio::select! {
                _ = cancel.cancelled() => None,
                report = app.runtime().handle_turn(turn) => Some(report),
            };
            if let Some(report) = report {
                repl::print_report(&report, args.output);
            }
            Ok(())
        }
        Command::Chat | Command::CheckConfig => {
            Repl::new(
                app.clone(),
                transport.clone(),
                args.conversation.clone(),
                args.actor.clone(),
                args.output,
            )
            .run(cancel.clone())
            .await
        }
    };

    cancel.cancel();
    ctrl_c.abort();
    sweeper.await.ok();
    renderer_handle.abort();
    result
}

fn print_config_summary(config: &Config, output: OutputFormat) -> dispatch_ai_core::Result<()> {
    match output {
        OutputFormat::Text => {
            println!("Config is valid.");
            println!(
                "Provider: {} ({})",
                config.provider.name, config.provider.base_url
            );
            for (label, slot) in [
                ("primary", ModelSlot::Primary),
                ("fast", ModelSlot::Fast),
                ("alternate", ModelSlot::Alternate),
                ("reliable", ModelSlot::Reliable),
            ] {
                println!("Model {label}: {}", config.models.resolve(slot));
            }
            println!("Workspace: {}", config.workspace.root);
            let rungs: Vec<&str> = config
                .orchestrator
                .rungs
                .iter()
                .map(|rung| rung.name.as_str())
                .collect();
            println!("Strategies: {}", rungs.join(" -> "));
        }
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(config).map_err(|err| {
                dispatch_ai_core::Error::Config(format!("failed to encode config: {err}"))
            })?;
            println!("{rendered}");
        }
    }
    Ok(())
}
