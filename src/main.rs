use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use anima::anchors::{AnchorStore, build};
use anima::brain::{Brain, DEFAULT_PERSONA, TurnMode};
use anima::config;
use anima::memory::rollup::PersonalityMemory;
use anima::memory::session::SessionMemory;
use anima::provider;
use anima::relationship::RelationshipTracker;
use anima::server;

#[derive(Parser)]
#[command(name = "anima")]
#[command(about = "A persona orchestration runtime with layered emotional memory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,

        /// Path to a persona instructions file
        #[arg(long)]
        persona: Option<String>,
    },

    /// Interactive conversation in the terminal
    Chat {
        /// User identifier for relationship and long-term memory
        #[arg(short, long)]
        user: String,

        /// Path to a persona instructions file
        #[arg(long)]
        persona: Option<String>,
    },

    /// Build an embedded anchor file from its raw JSON source
    Embed {
        /// Which anchor collection to build
        #[arg(value_enum)]
        kind: EmbedKind,

        /// Raw JSON source file
        #[arg(short, long)]
        input: String,

        /// Embedded JSON output file
        #[arg(short, long)]
        output: String,
    },

    /// Show runtime status
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedKind {
    /// Nested category:subtoken emotion tokens
    Emotions,
    /// Major emotional themes
    Major,
    /// Psychological patterns
    Patterns,
    /// Moral values and memory fragments
    Moral,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind, persona } => {
            let cfg = config::load()?;
            let server_config = server::Config {
                port: port.unwrap_or(cfg.server.port),
                bind: bind.unwrap_or_else(|| cfg.server.bind.clone()),
            };
            let state = build_state(cfg, persona)?;
            server::run(server_config, state).await
        }
        Commands::Chat { user, persona } => {
            let cfg = config::load()?;
            let state = build_state(cfg, persona)?;
            chat_loop(state, &user).await
        }
        Commands::Embed { kind, input, output } => {
            let cfg = config::load()?;
            let embedder = provider::embedder_from_config(&cfg.provider)?;
            let input = std::path::Path::new(&input);
            let output = std::path::Path::new(&output);
            let count = match kind {
                EmbedKind::Emotions => {
                    build::build_emotion_tokens(embedder.as_ref(), input, output).await?
                }
                EmbedKind::Major => {
                    build::build_major_emotions(embedder.as_ref(), input, output).await?
                }
                EmbedKind::Patterns => {
                    build::build_patterns(embedder.as_ref(), input, output).await?
                }
                EmbedKind::Moral => build::build_moral(embedder.as_ref(), input, output).await?,
            };
            println!("embedded {count} anchors -> {}", output.display());
            Ok(())
        }
        Commands::Status => {
            println!("anima v{}", env!("CARGO_PKG_VERSION"));
            println!("status: idle");
            Ok(())
        }
    }
}

fn build_state(
    cfg: config::AnimaConfig,
    persona_path: Option<String>,
) -> anyhow::Result<Arc<server::AppState>> {
    let anchors = Arc::new(AnchorStore::load(&cfg.data)?);

    let embedder: Arc<dyn provider::EmbeddingProvider> =
        Arc::from(provider::embedder_from_config(&cfg.provider)?);
    let chat: Arc<dyn provider::ChatProvider> =
        Arc::from(provider::chat_from_config(&cfg.provider)?);

    let persona = match persona_path {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read persona file {path}: {e}"))?,
        None => DEFAULT_PERSONA.to_string(),
    };

    let tracker = RelationshipTracker::open(
        cfg.data.resolve(&cfg.data.relationships),
        cfg.relationship.clone(),
    )?;
    let personality = PersonalityMemory::open(
        cfg.data.resolve(&cfg.data.fragments),
        cfg.data.resolve(&cfg.data.sketches),
        cfg.data.resolve(&cfg.data.pictures),
        cfg.rollup,
    )?;

    Ok(Arc::new(server::AppState {
        brain: Brain::new(anchors, embedder, chat, Arc::new(cfg)),
        session: Mutex::new(SessionMemory::new(persona)),
        tracker: Mutex::new(tracker),
        personality: Mutex::new(personality),
    }))
}

/// Multiline terminal conversation: input ends on a blank line; "exit",
/// "quit", or "goodbye" closes the session and banks a personality fragment.
async fn chat_loop(state: Arc<server::AppState>, user_id: &str) -> anyhow::Result<()> {
    {
        let mut tracker = state.tracker.lock().await;
        if tracker.get_user_relationship(user_id).is_none() {
            tracker.register_user(user_id, user_id)?;
            println!("Nice to meet you, {user_id}.");
        } else {
            println!("Welcome back, {user_id}.");
        }
    }
    println!("What's on your mind today? (press Enter twice to send)");

    loop {
        // EOF (ctrl-d) ends the session like a goodbye would
        let Some(input) = read_multiline()? else {
            break;
        };
        if input.is_empty() {
            continue;
        }
        let closing = matches!(
            input.trim().to_lowercase().as_str(),
            "exit" | "quit" | "goodbye"
        );
        if closing {
            break;
        }

        let mode = state.brain.triage(&input).await;
        let mut session = state.session.lock().await;
        let mut tracker = state.tracker.lock().await;
        let personality = state.personality.lock().await;

        let result = match mode {
            TurnMode::Light => {
                state
                    .brain
                    .handle_light_turn(user_id, &input, &mut session, &mut tracker, &personality)
                    .await
            }
            TurnMode::Full => {
                state
                    .brain
                    .handle_turn(user_id, &input, &mut session, &mut tracker, &personality)
                    .await
            }
        };

        match result {
            Ok(output) => {
                println!("\n{}\n", output.reply);
                state
                    .brain
                    .summarize_interaction(&mut session, &input, &output.reply)
                    .await;
            }
            Err(e) => eprintln!("turn failed: {e}"),
        }
    }

    // Session end: distill what happened into long-term memory.
    let session = state.session.lock().await;
    let mut tracker = state.tracker.lock().await;
    let mut personality = state.personality.lock().await;
    match state
        .brain
        .finish_session(user_id, &session, &mut personality, &mut tracker)
        .await
    {
        Ok(Some(outcome)) => println!("(session remembered: {outcome:?})"),
        Ok(None) => {}
        Err(e) => eprintln!("failed to bank session memory: {e}"),
    }
    println!("Take care.");
    Ok(())
}

fn read_multiline() -> anyhow::Result<Option<String>> {
    print!("> ");
    std::io::stdout().flush()?;
    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    let mut saw_input = false;
    for line in stdin.lock().lines() {
        let line = line?;
        saw_input = true;
        if line.trim().is_empty() {
            break;
        }
        lines.push(line);
    }
    if !saw_input {
        return Ok(None);
    }
    Ok(Some(lines.join("\n")))
}
