//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::cli::context::AppContext;
use crate::cli::listen_for_interrupts;
use crate::core::chat_stream::StreamMessage;
use crate::core::delivery::{ExchangeRequest, ExchangeRunner};
use crate::core::error::DeliveryError;
use crate::core::message::Turn;

pub async fn run_say(context: &AppContext, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: chatline say <prompt>");
        std::process::exit(1);
    }

    let delivery = context.delivery()?;
    if !delivery.is_configured() {
        eprintln!(
            "❌ No API key configured. Run `chatline auth <key>`, pass --api-key, or set {}",
            crate::cli::context::API_KEY_ENV
        );
        std::process::exit(1);
    }

    let stream = context.stream();
    let cancel_token = CancellationToken::new();
    let mut interrupts = listen_for_interrupts()?;
    let (runner, mut rx) = ExchangeRunner::new();
    runner.spawn_exchange(
        delivery,
        ExchangeRequest {
            stream_id: 1,
            turns: vec![Turn::user(prompt)],
            cancel_token: cancel_token.clone(),
            stream,
        },
    );

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some((StreamMessage::Chunk(content), _)) => {
                    print!("{content}");
                    io::stdout().flush()?;
                }
                Some((StreamMessage::Restart, _)) => {
                    eprintln!("\n[connection interrupted, retrying]");
                }
                Some((StreamMessage::Done(text), _)) => {
                    if !stream {
                        print!("{text}");
                    }
                    println!();
                    break;
                }
                Some((StreamMessage::Failed(DeliveryError::Cancelled), _)) => {
                    eprintln!("\n[stopped]");
                    std::process::exit(130);
                }
                Some((StreamMessage::Failed(err), _)) => {
                    eprintln!("\n\n❌ Error: {err}");
                    std::process::exit(1);
                }
                None => break,
            },
            Some(()) = interrupts.recv(), if !cancel_token.is_cancelled() => {
                cancel_token.cancel();
            }
        }
    }

    Ok(())
}
