//! Huddle terminal client.
//!
//! Joins one conversation, prints the log as it grows and sends every typed
//! line. Logs go to stderr so stdout carries only the conversation.
//!
//! # Usage
//!
//! ```bash
//! # Join team-a on a local backend
//! huddle --user u1 --name Alice --conversation team-a
//!
//! # Secure backend with an API key
//! HUDDLE_API_KEY=... huddle --server https://chat.example.com --user u1 --conversation team-a
//! ```

mod input;
mod render;

use std::time::Duration;

use clap::Parser;
use huddle_client::{ClientConfig, SessionHandle, SessionView, config::DEFAULT_SERVER_URL};
use huddle_core::{ConversationId, Identity, ReconnectPolicy};
use input::{HELP, Input};
use render::Renderer;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::watch,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat client
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Realtime chat client for huddle conversations")]
#[command(version)]
struct Args {
    /// Backend base URL (ws, wss, http or https)
    #[arg(short, long, env = "HUDDLE_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// User id to identify as
    #[arg(short, long, env = "HUDDLE_USER")]
    user: String,

    /// Display name (defaults to the user id)
    #[arg(short, long)]
    name: Option<String>,

    /// Conversation to join
    #[arg(short, long)]
    conversation: String,

    /// API key sent with every request
    #[arg(long, env = "HUDDLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Reconnect attempts before giving up (at least 1)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// First reconnect delay in milliseconds (doubles per attempt)
    #[arg(long, default_value = "1000")]
    base_delay_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    #[arg(long, default_value = "10000")]
    max_delay_ms: u64,

    /// Seconds to wait for the stream to open
    #[arg(long, default_value = "10")]
    handshake_timeout: u64,

    /// Seconds to wait for history and presence requests
    #[arg(long, default_value = "10")]
    request_timeout: u64,

    /// Refresh the online count every N seconds while connected
    #[arg(long)]
    presence_poll: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig, huddle_client::ClientError> {
        let mut config = ClientConfig::new(&self.server)?;
        config.api_key.clone_from(&self.api_key);
        config.request_timeout = Duration::from_secs(self.request_timeout);
        config.session.connection.handshake_timeout = Duration::from_secs(self.handshake_timeout);
        config.session.connection.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        };
        config.session.presence_poll_interval = self.presence_poll.map(Duration::from_secs);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let config = args.client_config()?;
    let identity = Identity::new(args.user.as_str(), args.name.as_deref().unwrap_or(&args.user));
    let conversation_id =
        ConversationId::new(args.conversation.as_str()).ok_or("conversation id must not be blank")?;

    tracing::info!(server = %config.server_url, conversation = %conversation_id, "huddle starting");

    let (handle, runtime) = huddle_client::spawn(config)?;
    let printer = tokio::spawn(print_views(handle.subscribe()));

    handle.set_identity(identity).await?;
    handle.select_conversation(conversation_id).await?;

    read_input(&handle).await?;

    handle.shutdown().await?;
    runtime.await?;
    printer.abort();

    tracing::info!("huddle stopped");
    Ok(())
}

/// Process typed lines until `/quit` or end of input.
async fn read_input(handle: &SessionHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    while let Some(line) = lines.next_line().await? {
        let notice = match Input::parse(&line) {
            Input::Message(body) => handle.send(body).await.err().map(|error| format!("not sent: {error}")),
            Input::Retry => {
                handle.retry().await?;
                None
            },
            Input::Dismiss => {
                handle.dismiss_banner().await?;
                None
            },
            Input::Join(conversation_id) => {
                handle.select_conversation(conversation_id).await?;
                None
            },
            Input::Leave => {
                handle.teardown().await?;
                None
            },
            Input::Quit => break,
            Input::Help => Some(HELP.to_string()),
            Input::Empty => None,
            Input::Unknown(problem) => Some(format!("{problem} (try /help)")),
        };

        if let Some(notice) = notice {
            stderr.write_all(format!("{notice}\n").as_bytes()).await?;
            stderr.flush().await?;
        }
    }
    Ok(())
}

/// Print every view change until the session goes away.
async fn print_views(mut views: watch::Receiver<SessionView>) -> std::io::Result<()> {
    let mut renderer = Renderer::default();
    let mut stdout = tokio::io::stdout();

    loop {
        let text = renderer.render(&views.borrow_and_update());
        if !text.is_empty() {
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
        if views.changed().await.is_err() {
            return Ok(());
        }
    }
}
