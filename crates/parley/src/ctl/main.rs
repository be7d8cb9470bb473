//! parleyctl - command-line chat client for the Parley relay
//!
//! Owns the local session and prompt stores and renders replies as they stream
//! in from the relay.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use parley::client::{ChatClient, DEFAULT_SERVER_URL, RelayClient, StreamOutcome};
use parley::prompts::{NewPrompt, Prompt, PromptPatch, PromptStore};
use parley::protocol::FileAttachment;
use parley::sessions::{ChatSession, SessionEvent, SessionPatch, SessionStore};
use parley::storage::{Storage, StorageConfig, create_storage};

const APP_NAME: &str = "parley";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init()
        .ok();

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let storage = create_storage(StorageConfig::Local(data_dir));
    let relay = RelayClient::new(&cli.server);

    match cli.command {
        Command::Status => handle_status(&relay, cli.json).await,
        Command::Chat(cmd) => handle_chat(storage, relay, cmd, cli.json).await,
        Command::Sessions { command } => handle_sessions(storage, command, cli.json).await,
        Command::Prompts { command } => handle_prompts(storage, command, cli.json).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "parleyctl",
    author,
    version,
    about = "Chat client for the Parley relay - stream replies and manage local sessions and prompts."
)]
struct Cli {
    /// Relay server URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "PARLEY_SERVER_URL")]
    server: String,

    /// Directory holding local sessions and prompts
    #[arg(long, value_name = "PATH", env = "PARLEY_DATA_DIR", global = true)]
    data_dir: Option<String>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check relay status
    Status,

    /// Send a message and stream the reply
    Chat(ChatCommand),

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        command: PromptsCommand,
    },
}

#[derive(Debug, clap::Args)]
struct ChatCommand {
    /// Message text
    message: Option<String>,
    /// Target session ID (default: current session, created if none exist)
    #[arg(long)]
    session: Option<String>,
    /// Attach a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    /// Start the message with a stored prompt's body
    #[arg(long, value_name = "PROMPT_ID")]
    prompt: Option<String>,
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    /// List all sessions
    List,
    /// Create a session and make it current
    New {
        /// Session name
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a session's messages
    Show {
        /// Session ID (default: current)
        id: Option<String>,
    },
    /// Make a session current
    Use { id: String },
    /// Rename a session
    Rename { id: String, name: String },
    /// Remove all messages from a session
    Clear { id: String },
    /// Delete a session
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum PromptsCommand {
    /// List all prompts
    List,
    /// Add a prompt
    Add { title: String, content: String },
    /// Show a prompt
    Show { id: String },
    /// Update a prompt's title and/or content
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a prompt
    Delete { id: String },
}

async fn handle_status(relay: &RelayClient, json: bool) -> Result<()> {
    match relay.status().await {
        Ok(status) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"status": "ok", "server": relay.base_url(), "message": status.message})
                );
            } else {
                println!("Relay is running at {} ({})", relay.base_url(), status.message);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"status": "error", "server": relay.base_url(), "error": e.to_string()})
                );
                Ok(())
            } else {
                Err(e).with_context(|| format!("relay at {} is not reachable", relay.base_url()))
            }
        }
    }
}

async fn handle_chat(
    storage: Arc<dyn Storage>,
    relay: RelayClient,
    cmd: ChatCommand,
    json: bool,
) -> Result<()> {
    let sessions = Arc::new(
        SessionStore::open(storage.clone())
            .await
            .context("loading sessions")?,
    );

    let prompt = match &cmd.prompt {
        Some(id) => {
            let prompts = PromptStore::open(storage).await.context("loading prompts")?;
            Some(
                prompts
                    .get_prompt(id)
                    .await
                    .ok_or_else(|| anyhow!("prompt not found: {}", id))?,
            )
        }
        None => None,
    };
    let content = compose_message(prompt.as_ref(), cmd.message.as_deref());

    let file = match &cmd.file {
        Some(path) => Some(read_attachment(path).await?),
        None => None,
    };

    let session_id = match cmd.session {
        Some(id) => id,
        None => sessions.ensure_session().await?.id,
    };

    let client = ChatClient::new(sessions.clone(), relay);
    let mut events = sessions.subscribe();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let send = client.send(&session_id, content, file, Some(cancel));
    tokio::pin!(send);

    let mut stdout = io::stdout();
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            event = events.recv() => match event {
                Ok(event) => render_event(&mut stdout, &session_id, event, json)?,
                Err(RecvError::Lagged(skipped)) => log::warn!("Skipped {} render event(s)", skipped),
                Err(RecvError::Closed) => {}
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        render_event(&mut stdout, &session_id, event, json)?;
    }

    let session = sessions.get_session(&session_id).await;
    match result {
        Ok(outcome) => {
            if json {
                let reply = session.as_ref().and_then(ChatSession::last_message);
                println!(
                    "{}",
                    serde_json::json!({"session_id": session_id, "outcome": format!("{:?}", outcome), "reply": reply})
                );
            } else {
                println!();
                match outcome {
                    StreamOutcome::Completed => {}
                    StreamOutcome::Cancelled => eprintln!("(cancelled)"),
                    StreamOutcome::Interrupted => eprintln!("(reply interrupted by the relay)"),
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(reply) = session.as_ref().and_then(ChatSession::last_message) {
                eprintln!("{}", reply.content);
            }
            Err(e).context("chat request failed")
        }
    }
}

fn render_event(out: &mut impl Write, session_id: &str, event: SessionEvent, json: bool) -> Result<()> {
    let SessionEvent::FragmentAppended {
        session_id: target,
        fragment,
    } = event
    else {
        return Ok(());
    };
    if json || target != session_id {
        return Ok(());
    }
    write!(out, "{}", fragment)?;
    out.flush()?;
    Ok(())
}

/// Prompt body first, then the typed message.
fn compose_message(prompt: Option<&Prompt>, message: Option<&str>) -> String {
    match (prompt, message) {
        (Some(prompt), Some(message)) if !message.is_empty() => {
            format!("{}\n\n{}", prompt.content, message)
        }
        (Some(prompt), _) => prompt.content.clone(),
        (None, message) => message.unwrap_or_default().to_string(),
    }
}

async fn read_attachment(path: &Path) -> Result<FileAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("not a file: {}", path.display()))?;
    let media_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(FileAttachment {
        name,
        media_type,
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

async fn handle_sessions(
    storage: Arc<dyn Storage>,
    command: SessionsCommand,
    json: bool,
) -> Result<()> {
    let sessions = SessionStore::open(storage).await.context("loading sessions")?;

    match command {
        SessionsCommand::List => {
            let all = sessions.list_sessions().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                let current = sessions.current_session_id().await;
                println!("  {:<36} {:<34} {:>8}", "ID", "NAME", "MESSAGES");
                println!("{}", "-".repeat(82));
                for session in all {
                    let marker = if current.as_deref() == Some(session.id.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    println!(
                        "{} {:<36} {:<34} {:>8}",
                        marker,
                        session.id,
                        session.name,
                        session.messages.len()
                    );
                }
            }
        }
        SessionsCommand::New { name } => {
            let session = sessions.create_session().await?;
            let session = match name {
                Some(name) => {
                    sessions
                        .update_session(&session.id, SessionPatch::rename(name))
                        .await?;
                    sessions
                        .get_session(&session.id)
                        .await
                        .ok_or_else(|| anyhow!("session vanished: {}", session.id))?
                }
                None => session,
            };
            print_session_summary(&session, json)?;
        }
        SessionsCommand::Show { id } => {
            let session = match id {
                Some(id) => sessions.get_session(&id).await,
                None => sessions.current_session().await,
            }
            .ok_or_else(|| anyhow!("session not found"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!("Session: {} ({})", session.name, session.id);
                for message in &session.messages {
                    println!();
                    println!("[{}]", message.role);
                    println!("{}", message.content);
                    if let Some(file) = &message.file {
                        println!("  (attached: {} {})", file.name, file.media_type);
                    }
                }
            }
        }
        SessionsCommand::Use { id } => {
            sessions.set_current_session(Some(&id)).await?;
            if !json {
                println!("Current session: {}", id);
            }
        }
        SessionsCommand::Rename { id, name } => {
            require(
                sessions
                    .update_session(&id, SessionPatch::rename(name))
                    .await?,
                "session",
                &id,
            )?;
            if !json {
                println!("Session {} renamed", id);
            }
        }
        SessionsCommand::Clear { id } => {
            require(sessions.clear_session_messages(&id).await?, "session", &id)?;
            if !json {
                println!("Session {} cleared", id);
            }
        }
        SessionsCommand::Delete { id } => {
            require(sessions.delete_session(&id).await?, "session", &id)?;
            if json {
                println!("{}", serde_json::json!({"status": "deleted", "id": id}));
            } else {
                println!("Session {} deleted", id);
            }
        }
    }
    Ok(())
}

async fn handle_prompts(
    storage: Arc<dyn Storage>,
    command: PromptsCommand,
    json: bool,
) -> Result<()> {
    let prompts = PromptStore::open(storage).await.context("loading prompts")?;

    match command {
        PromptsCommand::List => {
            let all = prompts.list_prompts().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                println!("{:<36} {:<30}", "ID", "TITLE");
                println!("{}", "-".repeat(67));
                for prompt in all {
                    println!("{:<36} {:<30}", prompt.id, prompt.title);
                }
            }
        }
        PromptsCommand::Add { title, content } => {
            let prompt = prompts.add_prompt(NewPrompt::new(title, content)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prompt)?);
            } else {
                println!("Prompt {} added", prompt.id);
            }
        }
        PromptsCommand::Show { id } => {
            let prompt = prompts
                .get_prompt(&id)
                .await
                .ok_or_else(|| anyhow!("prompt not found: {}", id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prompt)?);
            } else {
                println!("{}", prompt.title);
                println!();
                println!("{}", prompt.content);
            }
        }
        PromptsCommand::Update { id, title, content } => {
            let patch = PromptPatch { title, content };
            if patch.is_empty() {
                bail!("nothing to update (use --title and/or --content)");
            }
            require(prompts.update_prompt(&id, patch).await?, "prompt", &id)?;
            if !json {
                println!("Prompt {} updated", id);
            }
        }
        PromptsCommand::Delete { id } => {
            require(prompts.delete_prompt(&id).await?, "prompt", &id)?;
            if json {
                println!("{}", serde_json::json!({"status": "deleted", "id": id}));
            } else {
                println!("Prompt {} deleted", id);
            }
        }
    }
    Ok(())
}

fn print_session_summary(session: &ChatSession, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
    } else {
        println!("Created session {} ({})", session.id, session.name);
    }
    Ok(())
}

fn require(found: bool, kind: &str, id: &str) -> Result<()> {
    if found {
        Ok(())
    } else {
        bail!("{} not found: {}", kind, id)
    }
}

fn resolve_data_dir(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        let expanded = shellexpand::full(dir).context("expanding data dir")?;
        return Ok(PathBuf::from(expanded.to_string()));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}
