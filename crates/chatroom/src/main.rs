//! The chat room in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use chatroom::AppConfig;
use chatroom::core::{
    ChatClient, ConversationId, ConversationMeta, MessageLog, Role,
    SessionOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

enum UiEvent {
    Changed(ConversationId, MessageLog),
    Ended(ConversationId, SessionOutcome),
}

/// The answer currently being printed.
struct Streaming {
    id: ConversationId,
    printed: usize,
    progress_bar: Option<ProgressBar>,
}

const BAR_CHAR: &str = "▎";
const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

const HELP: &str = "\
/new          start a new chat
/list         list chats
/select N     switch to chat N
/delete N     delete chat N
/rename NAME  rename the current chat
/clear        remove all messages of the current chat
/cancel       stop the answer being received
/quit         leave";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let builder = match config.client_builder() {
        Ok(builder) => builder,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let client = builder
        .on_change({
            let event_tx = event_tx.clone();
            move |id, log| {
                event_tx.send(UiEvent::Changed(id, log.clone())).ok();
            }
        })
        .on_session_end(move |id, outcome| {
            event_tx.send(UiEvent::Ended(id, outcome.clone())).ok();
        })
        .build();

    if let Err(err) = greet(&client).await {
        eprintln!("{err}");
        return;
    }

    let mut lines_rx = spawn_line_reader();
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut streaming: Option<Streaming> = None;
    let mut prompt_pending = true;

    loop {
        if prompt_pending && streaming.is_none() {
            prompt_pending = false;
            print!("> ");
            std::io::stdout().flush().ok();
        }

        let spinning = streaming
            .as_ref()
            .is_some_and(|s| s.progress_bar.is_some());
        select! {
            line = lines_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                prompt_pending = true;
                let line = line.trim();
                if streaming.is_some() {
                    if line == "/cancel" {
                        client.cancel().await.ok();
                    } else if !line.is_empty() {
                        println!("{}", "Wait for the answer, or /cancel it.".dimmed());
                    }
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if let Some(command) = line.strip_prefix('/') {
                    if let Err(err) = run_command(&client, command).await {
                        eprintln!("{}", err.bright_red());
                    }
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                match client.submit(line).await {
                    Ok(id) => {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("🤔 Thinking...");
                        streaming = Some(Streaming {
                            id,
                            printed: 0,
                            progress_bar: Some(progress_bar),
                        });
                    }
                    Err(err) => eprintln!("{}", err.bright_red()),
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                let Some(current) = &mut streaming else {
                    continue;
                };
                match event {
                    UiEvent::Changed(id, log) if id == current.id => {
                        print_answer_progress(current, &log);
                    }
                    UiEvent::Ended(id, outcome) if id == current.id => {
                        if let Some(progress_bar) = current.progress_bar.take() {
                            progress_bar.finish_and_clear();
                        }
                        println!();
                        match outcome {
                            SessionOutcome::Completed => {}
                            SessionOutcome::Errored(err) => {
                                println!("{}", err.dimmed());
                            }
                            SessionOutcome::Cancelled => {
                                println!("{}", "(cancelled)".dimmed());
                            }
                        }
                        streaming = None;
                        prompt_pending = true;
                    }
                    _ => {}
                }
            }
            _ = sleep(Duration::from_millis(100)), if spinning => {
                if let Some(progress_bar) =
                    streaming.as_ref().and_then(|s| s.progress_bar.as_ref())
                {
                    progress_bar.inc(1);
                }
            }
        }
    }

    client.shutdown();
}

/// Makes sure a chat is active and shows it.
async fn greet(client: &ChatClient) -> Result<(), chatroom::core::ClientError> {
    if client.active_id().await?.is_none() {
        client.create().await?;
    }
    println!("{}", "Type a message, or /help for commands.".dimmed());
    show_active(client).await
}

async fn run_command(
    client: &ChatClient,
    command: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "help" => println!("{HELP}"),
        "new" => {
            client.create().await?;
            show_active(client).await?;
        }
        "list" => {
            let active = client.active_id().await?;
            let metas = client.conversations().await?;
            if metas.is_empty() {
                println!("{}", "No chats yet, /new starts one.".dimmed());
            }
            for (index, meta) in metas.iter().enumerate() {
                print_meta(index + 1, meta, active == Some(meta.id));
            }
        }
        "select" => {
            let id = conversation_at(client, arg).await?;
            client.select(id).await?;
            show_active(client).await?;
        }
        "delete" => {
            let id = conversation_at(client, arg).await?;
            client.delete(id).await?;
            println!("{}", "Deleted.".dimmed());
        }
        "rename" => {
            if arg.is_empty() {
                return Err("usage: /rename NAME".into());
            }
            let id = client
                .active_id()
                .await?
                .ok_or("no chat is active")?;
            client.rename(id, arg).await?;
        }
        "clear" => {
            client.clear().await?;
            println!("{}", "Cleared.".dimmed());
        }
        "cancel" => {
            println!("{}", "Nothing to cancel.".dimmed());
        }
        _ => return Err(format!("unknown command /{name}, try /help").into()),
    }
    Ok(())
}

/// Resolves a 1-based position in the chat list.
async fn conversation_at(
    client: &ChatClient,
    arg: &str,
) -> Result<ConversationId, Box<dyn std::error::Error>> {
    let index: usize = arg
        .parse()
        .map_err(|_| format!("expected a chat number, got {arg:?}"))?;
    let metas = client.conversations().await?;
    index
        .checked_sub(1)
        .and_then(|i| metas.get(i))
        .map(|meta| meta.id)
        .ok_or_else(|| format!("there is no chat {index}, see /list").into())
}

async fn show_active(
    client: &ChatClient,
) -> Result<(), chatroom::core::ClientError> {
    let Some(id) = client.active_id().await? else {
        return Ok(());
    };
    let name = client
        .conversations()
        .await?
        .into_iter()
        .find(|meta| meta.id == id)
        .map(|meta| meta.name)
        .unwrap_or_default();
    println!("{}", format!("── {name} ──").bright_white().bold());
    if let Some(log) = client.active_log().await? {
        print_log(&log);
    }
    Ok(())
}

fn print_meta(index: usize, meta: &ConversationMeta, active: bool) {
    let marker = if active { "*" } else { " " };
    let updated = meta.updated_at.format("%Y-%m-%d %H:%M");
    println!(
        "{marker}{index:>3}  {}  {}",
        meta.name.bright_white(),
        updated.dimmed()
    );
    if let Some(preview) = &meta.preview {
        let line = preview.lines().next().unwrap_or_default();
        println!("       {}", line.dimmed());
    }
}

fn print_log(log: &MessageLog) {
    for msg in log {
        match msg.role() {
            Role::User => {
                println!("{}{}", BAR_CHAR.bright_green(), msg.raw());
            }
            Role::Assistant => {
                if let Some(thinking) = msg.thinking() {
                    println!("{}{}", BAR_CHAR.bright_cyan(), thinking.dimmed());
                }
                println!(
                    "{}🤖 {}",
                    BAR_CHAR.bright_cyan(),
                    msg.content().bright_white()
                );
            }
        }
    }
}

/// Prints the part of the answer that arrived since the last call, with
/// the reasoning dimmed.
fn print_answer_progress(current: &mut Streaming, log: &MessageLog) {
    let Some(answer) = log.last().filter(|m| m.role() == Role::Assistant)
    else {
        return;
    };
    let raw = answer.raw();
    if raw.len() <= current.printed {
        return;
    }

    if let Some(progress_bar) = current.progress_bar.take() {
        progress_bar.finish_and_clear();
        print!("{}🤖 ", BAR_CHAR.bright_cyan());
    }

    let think = think_span(raw);
    let mut pos = current.printed;
    for boundary in [think.0, think.1, raw.len()] {
        if boundary <= pos {
            continue;
        }
        let text = &raw[pos..boundary];
        if pos >= think.0 && boundary <= think.1 {
            print!("{}", text.dimmed());
        } else {
            print!("{}", text.bright_white());
        }
        pos = boundary;
    }
    std::io::stdout().flush().ok();
    current.printed = raw.len();
}

/// Returns the byte range of the first reasoning block, which is empty
/// when there is none. An unclosed block extends to the end.
fn think_span(raw: &str) -> (usize, usize) {
    let Some(start) = raw.find(THINK_OPEN) else {
        return (raw.len(), raw.len());
    };
    let end = raw[start..]
        .find(THINK_CLOSE)
        .map_or(raw.len(), |i| start + i + THINK_CLOSE.len());
    (start, end)
}

/// Reads stdin on its own task, so a pending read never loses input.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stdin = io::BufReader::new(io::stdin());
        loop {
            let mut line = String::new();
            match stdin.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!("error reading input: {}", err);
                    break;
                }
            }
        }
    });
    line_rx
}
