use dispatch_ai_core::events::Event;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::cli::OutputFormat;

pub struct Renderer {
    output_format: OutputFormat,
}

impl Renderer {
    pub fn new(output_format: OutputFormat) -> Self {
        Self { output_format }
    }

    /// Prints events until the bus is dropped.
    pub async fn run(self, mut events: broadcast::Receiver<Event>) {
        loop {
            match events.recv().await {
                Ok(event) => self.render_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("[events] skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn render_event(&self, event: &Event) {
        match self.output_format {
            OutputFormat::Text => self.render_text(event),
            OutputFormat::Json => self.render_json(event),
        }
    }

    fn render_text(&self, event: &Event) {
        match event {
            Event::TurnStarted { command_id, .. } => println!("[turn] started ({command_id})"),
            Event::IntentClassified {
                intent,
                plan,
                plan_confidence,
                ..
            } => match (plan, plan_confidence) {
                (Some(plan), Some(confidence)) => println!(
                    "[intent] {} (plan: {} {:.2})",
                    intent.label(),
                    plan.label(),
                    confidence
                ),
                _ => println!("[intent] {}", intent.label()),
            },
            Event::RungStarted {
                rung,
                strategy,
                model,
                ..
            } => println!("[attempt {rung}] {strategy} on {model}"),
            Event::RungRejected {
                rung,
                strategy,
                reason,
                ..
            } => println!("[attempt {rung}] {strategy} rejected: {reason}"),
            Event::ModelSwitched {
                from, to, reason, ..
            } => println!("[model] {from} -> {to} ({reason})"),
            Event::ToolStarted { tool, args, .. } => println!(
                "[tool] {tool} {}",
                serde_json::to_string(args).unwrap_or_else(|_| "<invalid args>".to_owned())
            ),
            Event::ToolFinished {
                tool,
                success,
                duration_ms,
                ..
            } => {
                let status = if *success { "OK" } else { "FAILED" };
                println!("[tool:{tool}] {status} ({duration_ms} ms)");
            }
            Event::TurnFinished {
                success,
                failure,
                elapsed_ms,
                ..
            } => {
                if *success {
                    println!("[turn] finished in {elapsed_ms} ms");
                } else {
                    println!(
                        "[turn] failed ({}) after {elapsed_ms} ms",
                        failure.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    fn render_json(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("[events] failed to encode event: {err}"),
        }
    }
}
