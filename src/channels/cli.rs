//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Menus are printed as a numbered list; typing a number picks that option.
//! `/contact <phone>` simulates sharing a contact card.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::stream;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::engine::EventKind;
use crate::error::ChannelError;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("tag pattern is a valid regex"));

const LOCAL_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    /// Options of the last menu shown, for numeric selection.
    last_options: Arc<Mutex<Vec<String>>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Turn one input line into a message, resolving numeric menu picks.
fn parse_line(line: &str, options: &[String]) -> IncomingMessage {
    if let Some(phone) = line.strip_prefix("/contact ") {
        return IncomingMessage::new("cli", LOCAL_USER, phone.trim()).with_kind(EventKind::Contact);
    }
    let picked = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i));
    match picked {
        Some(label) => IncomingMessage::new("cli", LOCAL_USER, label).with_kind(EventKind::Choice),
        None => IncomingMessage::new("cli", LOCAL_USER, line),
    }
}

/// Plain-text rendering of a response for the terminal.
fn render(response: &OutgoingResponse) -> String {
    let mut out = HTML_TAG
        .replace_all(&response.content, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    if let Some(ref options) = response.options {
        for (i, option) in options.iter().enumerate() {
            out.push_str(&format!("\n  {}. {option}", i + 1));
        }
    }
    if response.request_contact {
        out.push_str("\n  (/contact <номер> — отправить контакт)");
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let last_options = Arc::clone(&self.last_options);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = parse_line(&line, &last_options.lock().await);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, recipient: &str, response: OutgoingResponse) -> Result<(), ChannelError> {
        if recipient == LOCAL_USER {
            *self.last_options.lock().await = response.options.clone().unwrap_or_default();
            println!("\n{}\n", render(&response));
        } else {
            println!("\n[→ {recipient}]\n{}\n", render(&response));
        }
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
