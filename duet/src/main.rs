use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use duet::chat::ChatHandle;
use duet::config::default_data_dir;
use duet::models::{Direction, Message, MessageKind};
use duet::session::{ChatEntry, Session};
use duet::storage::Storage;
use duet::{ChatId, Identity, Recipient};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::Mutex as TokioMutex;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const USAGE: &str = "\
Usage: duet [--data-dir DIR] <command>

Commands:
  login <email> [photo-url]   Sign in as <email>
  logout                      Sign out
  whoami                      Show the signed-in identity
  chats [query]               List chats, optionally filtered by recipient
  start <email>               Start a chat with <email>
  send <chat-id> <text...>    Send a message
  history <chat-id> [limit]   Show the most recent messages
  chat <chat-id>              Show history, then send every line read from stdin
  seen <email>                Show when <email> was last active";

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing subscriber with environment filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let data_dir = match args.first().map(String::as_str) {
        Some("--data-dir") => {
            if args.len() < 2 {
                return Err(anyhow!("--data-dir requires a value\n\n{USAGE}"));
            }
            let dir = PathBuf::from(args.remove(1));
            args.remove(0);
            dir
        }
        _ => default_data_dir()?,
    };
    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };
    let args = &args[1..];
    tracing::debug!(data_dir = %data_dir.display(), %command, "Starting");
    let storage = Storage::open(&data_dir).await?;
    let session = Session::open(Arc::new(TokioMutex::new(storage))).await?;
    match command.as_str() {
        "login" => {
            let identity: Identity = arg(args, 0, "email")?
                .parse()
                .map_err(|e| anyhow!("Invalid email: {e}"))?;
            let photo_url = args.get(1).cloned();
            session.sign_in(identity.clone(), photo_url).await?;
            println!("Signed in as {identity}");
        }
        "logout" => {
            session.sign_out().await?;
            println!("Signed out");
        }
        "whoami" => match session.account() {
            Some(account) => {
                println!("{}", account.identity);
                if let Some(photo_url) = account.photo_url {
                    println!("avatar: {photo_url}");
                }
            }
            None => println!("Not signed in"),
        },
        "chats" => {
            let query = args.join(" ");
            let entries = session.search_chats(&query).await?;
            if entries.is_empty() {
                println!("No chats");
            }
            for entry in entries {
                print_entry(&session, &entry).await?;
            }
        }
        "start" => {
            let chat = session.start_chat(arg(args, 0, "email")?).await?;
            let me = session.identity();
            println!(
                "{}  {}",
                chat.id(),
                format_recipient(&chat.recipient(me.as_ref()))
            );
        }
        "send" => {
            let chat_id = parse_chat_id(arg(args, 0, "chat-id")?)?;
            let text = args[1..].join(" ");
            let message = session.send_message(chat_id, &text).await?;
            println!("Sent at {}", message.create_time);
        }
        "history" => {
            let chat_id = parse_chat_id(arg(args, 0, "chat-id")?)?;
            let limit = match args.get(1) {
                Some(limit) => limit.parse().context("Invalid limit")?,
                None => DEFAULT_HISTORY_LIMIT,
            };
            let chat = session.open_chat(chat_id).await?;
            print_history(&session, &chat, limit).await?;
        }
        "chat" => {
            let chat_id = parse_chat_id(arg(args, 0, "chat-id")?)?;
            run_chat(&session, chat_id).await?;
        }
        "seen" => {
            let identity: Identity = arg(args, 0, "email")?
                .parse()
                .map_err(|e| anyhow!("Invalid email: {e}"))?;
            println!("Last active: {}", session.last_seen(&identity).await?);
        }
        other => return Err(anyhow!("Unknown command: {other}\n\n{USAGE}")),
    }
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str, anyhow::Error> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing <{name}>\n\n{USAGE}"))
}

fn parse_chat_id(s: &str) -> Result<ChatId, anyhow::Error> {
    s.parse().map_err(|e| anyhow!("Invalid chat id {s:?}: {e}"))
}

fn format_recipient(recipient: &Recipient) -> String {
    match recipient {
        Recipient::Known(identity) => identity.to_string(),
        Recipient::Provisional(identity) => format!("{identity} (?)"),
        Recipient::Unresolved => "(unknown)".to_string(),
    }
}

async fn print_entry(session: &Session, entry: &ChatEntry) -> Result<(), anyhow::Error> {
    let last_seen = match entry.recipient.identity() {
        Some(identity) => session.last_seen(identity).await?.to_string(),
        None => "Unavailable".to_string(),
    };
    println!(
        "{}  {}  last active: {}",
        entry.chat.id,
        format_recipient(&entry.recipient),
        last_seen
    );
    Ok(())
}

fn print_message(me: Option<&Identity>, message: &Message) {
    let marker = match me.map(|me| message.direction(me)) {
        Some(Direction::Sent) => ">",
        Some(Direction::Received) | None => "<",
    };
    let MessageKind::Text(text) = &message.kind;
    println!(
        "[{}] {marker} {}: {text}",
        message.create_time, message.author
    );
}

async fn print_history(
    session: &Session,
    chat: &ChatHandle,
    limit: usize,
) -> Result<(), anyhow::Error> {
    let me = session.identity();
    let recipient = chat.recipient(me.as_ref());
    let presence = session.recipient_presence(chat).await?;
    println!(
        "Chat with {}  last active: {}",
        format_recipient(&recipient),
        duet::models::LastSeen::from(presence.as_ref())
    );
    for message in chat.load_history(limit).await? {
        print_message(me.as_ref(), &message);
    }
    Ok(())
}

async fn run_chat(session: &Session, chat_id: ChatId) -> Result<(), anyhow::Error> {
    let chat = session.open_chat(chat_id).await?;
    print_history(session, &chat, DEFAULT_HISTORY_LIMIT).await?;
    let me = session.identity();
    let mut messages = chat.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(err) = session.send_message(chat_id, &line).await {
                    eprintln!("error: {err}");
                }
            }
            message = messages.recv() => {
                let Some(message) = message else {
                    return Ok(());
                };
                print_message(me.as_ref(), &message);
            }
        }
    }
}
