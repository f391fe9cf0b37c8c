use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dispatch_ai_core::conversation::{ChatTransport, InboundTurn, MessageHandle, Turn, TurnRole};
use dispatch_ai_core::error::{Error, Result};
use dispatch_ai_core::{DispatchAI, TurnReport};
use tokio_util::sync::CancellationToken;

use crate::cli::OutputFormat;

/// In-memory chat transport that prints replies to the terminal.
pub struct ConsoleTransport {
    history: Mutex<HashMap<String, Vec<Turn>>>,
    next_id: AtomicUsize,
    echo: bool,
}

impl ConsoleTransport {
    pub fn new(echo: bool) -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            echo,
        }
    }

    pub fn record_user(&self, conversation_id: &str, turn: Turn) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_owned())
            .or_default()
            .push(turn);
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn fetch_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let turns = history.get(conversation_id).cloned().unwrap_or_default();
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn send(&self, conversation_id: &str, text: &str) -> Result<MessageHandle> {
        let message_id = format!("console-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_owned())
            .or_default()
            .push(Turn {
                id: message_id.clone(),
                role: TurnRole::Assistant,
                text: text.to_owned(),
                timestamp: Utc::now(),
                reaction_summary: None,
            });
        if self.echo {
            println!("assistant> {text}");
        }
        Ok(MessageHandle {
            conversation_id: conversation_id.to_owned(),
            message_id,
        })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            let turn = history
                .get_mut(&handle.conversation_id)
                .and_then(|turns| turns.iter_mut().find(|turn| turn.id == handle.message_id))
                .ok_or_else(|| {
                    Error::NotFound(format!("message '{}' not found", handle.message_id))
                })?;
            turn.text = text.to_owned();
        }
        if self.echo {
            println!("assistant> {text}");
        }
        Ok(())
    }
}

pub fn inbound(conversation_id: &str, actor_id: &str, command_id: &str, text: &str) -> InboundTurn {
    InboundTurn {
        conversation_id: conversation_id.to_owned(),
        actor_id: actor_id.to_owned(),
        command_id: command_id.to_owned(),
        message_id: uuid::Uuid::new_v4().to_string(),
        text: text.to_owned(),
        timestamp: Utc::now(),
    }
}

pub fn print_report(report: &TurnReport, output_format: OutputFormat) {
    match output_format {
        OutputFormat::Text => println!("{}", report.text),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "type": "reply",
                "conversation_id": report.conversation_id,
                "text": report.text,
                "success": report.succeeded(),
                "failure": report.failure.map(|kind| kind.label()),
                "primary_actions": report.primary_actions,
                "strategy": report.strategy,
            });
            println!("{}", serde_json::to_string(&value).unwrap_or_default());
        }
    }
}

async fn read_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        io::stdin().read_line(&mut input).map(|read| (read, input))
    })
    .await
    .map_err(|err| Error::Io(io::Error::other(err)))?;

    let (read, input) = line?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_owned()))
}

pub struct Repl {
    app: Arc<DispatchAI>,
    transport: Arc<ConsoleTransport>,
    conversation_id: String,
    actor_id: String,
    output_format: OutputFormat,
}

impl Repl {
    pub fn new(
        app: Arc<DispatchAI>,
        transport: Arc<ConsoleTransport>,
        conversation_id: String,
        actor_id: String,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            app,
            transport,
            conversation_id,
            actor_id,
            output_format,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.output_format == OutputFormat::Text {
            println!();
            println!("dispatch-ai interactive chat");
            println!("Workspace: {}", self.app.workspace_root().display());
            println!("Type 'exit' or press Ctrl-C to quit");
            println!();
        }

        loop {
            if self.output_format == OutputFormat::Text {
                print!("> ");
                io::stdout().flush()?;
            }

            let input = tokio::select! {
                _ = cancel.cancelled() => break,
                line = read_line() => line?,
            };
            let Some(input) = input else {
                break;
            };

            if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                break;
            }
            if input.is_empty() {
                continue;
            }

            let command_id = match input.split_whitespace().next() {
                Some(word) if word.starts_with('/') => word.trim_start_matches('/').to_owned(),
                _ => "chat".to_owned(),
            };
            let turn = inbound(&self.conversation_id, &self.actor_id, &command_id, &input);
            self.transport
                .record_user(&self.conversation_id, turn.as_turn());

            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                report = self.app.runtime().handle_turn(turn) => report,
            };
            if self.output_format == OutputFormat::Json {
                print_report(&report, self.output_format);
            }
        }

        if self.output_format == OutputFormat::Text {
            println!("Goodbye!");
        }
        Ok(())
    }
}
