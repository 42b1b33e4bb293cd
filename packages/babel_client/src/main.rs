use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use babel_client::operations::{
    DEFAULT_RECENT_CONVERSATIONS, DEFAULT_RECENT_EVENTS_PER_CONVERSATION,
};
use babel_client::schema::{Response, TypingType};
use babel_client::{ChatApi, ClientConfig, Cookies, ReqwestFetch, SendChatMessage, Session};

#[derive(Parser)]
#[command(name = "babel")]
#[command(about = "Command-line access to the chat API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file layered over the defaults (BABEL_* env vars override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON object of authentication cookies
    #[arg(long, global = true, default_value = "cookies.json")]
    cookies: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in account
    Whoami,
    /// Send a message, optionally with an image attached
    Send {
        conversation: String,
        text: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// List recent inbox conversations
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_CONVERSATIONS)]
        max: u32,
    },
    /// Search people
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        max: u32,
    },
    /// Send a typing notification
    Typing {
        conversation: String,
        /// Send "stopped" instead of "started"
        #[arg(long)]
        stop: bool,
    },
    /// Set presence and mood
    Presence {
        #[arg(long)]
        idle: bool,
        #[arg(long)]
        mood: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "babel=debug,babel_client=debug,info"
    } else {
        "babel=info,babel_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = ClientConfig::load(cli.config.as_deref()).context("failed to load config")?;
    let cookies = read_cookies(&cli.cookies).await?;

    let proxy = config
        .proxy
        .clone()
        .or_else(|| std::env::var("HTTP_PROXY").ok().filter(|p| !p.is_empty()));
    let http = ReqwestFetch::new(proxy.as_deref()).context("failed to build HTTP client")?;
    let api = ChatApi::new(cookies, Arc::new(http), Session::shared(&config), &config);

    match cli.command {
        Commands::Whoami => {
            let info = api.get_self_info().await?;
            match info.email() {
                Some(email) => println!("{email}"),
                None => println!("(no email on account)"),
            }
        }
        Commands::Send {
            conversation,
            text,
            image,
        } => {
            let mut message = SendChatMessage::text(conversation, &text);
            if let Some(path) = image {
                let photo_id = api.upload_image_file(&path).await?;
                info!(photo_id = %photo_id, "attached image");
                message = message.with_image(photo_id);
            }
            print_response(&api.send_chat_message(&message).await?)?;
        }
        Commands::Recent { max } => {
            let response = api
                .sync_recent_conversations(max, DEFAULT_RECENT_EVENTS_PER_CONVERSATION)
                .await?;
            print_response(&response)?;
        }
        Commands::Search { query, max } => {
            print_response(&api.search_entities(&query, max).await?)?;
        }
        Commands::Typing { conversation, stop } => {
            let typing = if stop {
                TypingType::Stopped
            } else {
                TypingType::Started
            };
            print_response(&api.set_typing(&conversation, typing).await?)?;
        }
        Commands::Presence { idle, mood } => {
            print_response(&api.set_presence(!idle, mood.as_deref()).await?)?;
        }
    }
    Ok(())
}

async fn read_cookies(path: &Path) -> Result<Cookies> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read cookies from {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid cookie file {}", path.display()))
}

fn print_response(response: &Response) -> Result<()> {
    let fields = Value::Array(response.fields().to_vec());
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
