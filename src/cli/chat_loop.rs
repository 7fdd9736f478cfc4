//! Line-oriented interactive chat.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::listen_for_interrupts;
use crate::commands::{process_input, CommandResult};
use crate::core::chat_stream::StreamMessage;
use crate::core::controller::{Applied, ControllerError, ConversationController, ExchangeOutcome};
use crate::core::message::{Role, FALLBACK_REPLY};
use crate::core::providers::model_display_name;
use crate::core::snapshots::parse_chat_link;

const PROMPT: &str = "> ";

pub async fn run_chat(
    mut controller: ConversationController,
    mut events: mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    resume: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn Error>> {
    if let Some(link) = resume {
        let Some(chat_id) = parse_chat_link(&link) else {
            return Err(format!("Not a chat link or id: {link}").into());
        };
        controller.resume(&chat_id)?;
    }

    print_banner(&controller);
    print_transcript(&controller);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupts = listen_for_interrupts()?;
    let mut show_prompt = true;

    loop {
        if show_prompt && !controller.is_awaiting() {
            print!("{PROMPT}");
            io::stdout().flush()?;
            show_prompt = false;
        }

        tokio::select! {
            line = lines.next_line() => {
                let line = match read_input(line)? {
                    Input::Line(line) => line,
                    Input::Unreadable => {
                        show_prompt = true;
                        continue;
                    }
                    Input::Closed => {
                        if controller.is_awaiting() {
                            let _ = controller.stop();
                        }
                        println!();
                        break;
                    }
                };
                show_prompt = true;
                if line.trim().is_empty() {
                    continue;
                }
                match process_input(&mut controller, &line) {
                    CommandResult::Quit => {
                        if controller.is_awaiting() {
                            let _ = controller.stop();
                        }
                        break;
                    }
                    CommandResult::Notice(text) => println!("{text}"),
                    CommandResult::ProcessAsMessage(text) => match controller.submit(&text) {
                        Ok(exchange_id) => debug!(exchange_id, "Submitted message"),
                        Err(err @ ControllerError::MissingCredential) => eprintln!("❌ {err}"),
                        Err(err) => println!("{err}"),
                    },
                }
            }
            Some((message, exchange_id)) = events.recv() => {
                if render_event(controller.apply_event(exchange_id, message), stream)? {
                    show_prompt = true;
                }
            }
            Some(()) = interrupts.recv() => {
                if controller.stop().is_ok() {
                    println!("\n[stopped]");
                    show_prompt = true;
                } else {
                    println!();
                    break;
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq)]
enum Input {
    Line(String),
    /// The line was not valid UTF-8 and has been discarded.
    Unreadable,
    Closed,
}

fn read_input(line: io::Result<Option<String>>) -> io::Result<Input> {
    match line {
        Ok(Some(line)) => Ok(Input::Line(line)),
        Ok(None) => Ok(Input::Closed),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            warn!(error = %err, "Skipping input line that is not valid UTF-8");
            eprintln!("❌ Input must be UTF-8 text");
            Ok(Input::Unreadable)
        }
        Err(err) => Err(err),
    }
}

/// Print the visible effect of one event. Returns true once the exchange
/// has finished.
fn render_event(applied: Applied, stream: bool) -> io::Result<bool> {
    let mut stdout = io::stdout();
    match applied {
        Applied::Ignored => Ok(false),
        Applied::Chunk(text) => {
            write!(stdout, "{text}")?;
            stdout.flush()?;
            Ok(false)
        }
        Applied::Restart => {
            writeln!(stdout, "\n[connection interrupted, retrying]")?;
            Ok(false)
        }
        Applied::Finished(ExchangeOutcome::Replied(text)) => {
            if !stream {
                write!(stdout, "{text}")?;
            }
            writeln!(stdout)?;
            Ok(true)
        }
        Applied::Finished(ExchangeOutcome::Failed(err)) => {
            warn!(error = %err, "Exchange failed");
            writeln!(stdout, "\n{FALLBACK_REPLY}")?;
            Ok(true)
        }
        Applied::Finished(ExchangeOutcome::Cancelled) => {
            writeln!(stdout, "\n[stopped]")?;
            Ok(true)
        }
    }
}

fn print_banner(controller: &ConversationController) {
    let delivery = controller.delivery();
    match (delivery.provider_name(), delivery.model()) {
        (Some(provider), Some(model)) => {
            println!("💬 chatline · {provider} · {}", model_display_name(model));
        }
        _ => println!("💬 chatline · no API key configured (run `chatline auth <key>`)"),
    }
    println!("Type /help for commands, Ctrl+C to stop a response or quit.");
}

fn print_transcript(controller: &ConversationController) {
    for turn in controller.transcript() {
        match turn.role {
            Role::User => println!("{PROMPT}{}", turn.content),
            Role::Assistant => println!("{}\n", turn.content),
            Role::System => println!("[{}]", turn.content),
        }
    }
}
