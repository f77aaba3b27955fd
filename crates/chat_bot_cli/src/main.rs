use anyhow::Context;
use chat_bot::{Bot, BotConfig, BotDefinition, FileSessionStorage, ListenerEvent, ListenerKind};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chat-bot")]
#[command(about = "Run a rule-based chat bot defined in YAML")]
#[command(version)]
struct Cli {
    /// Bot definition file
    #[arg(long, env = "CHAT_BOT_DEFINITION", default_value = "demos/growth_bot.yaml")]
    definition: PathBuf,

    /// User id the conversation runs as
    #[arg(long, env = "CHAT_BOT_USER", default_value = "local")]
    user: String,

    /// Idle time before a session is evicted
    #[arg(long, env = "CHAT_BOT_SESSION_TIMEOUT_SECS", default_value = "1800")]
    session_timeout_secs: u64,

    /// Period of the session sweep
    #[arg(long, env = "CHAT_BOT_CLEANUP_INTERVAL_SECS", default_value = "3600")]
    cleanup_interval_secs: u64,

    /// Process messages of different users in parallel
    #[arg(long, env = "CHAT_BOT_CONCURRENT", default_value = "false")]
    concurrent: bool,

    /// Persist sessions as JSON files in this directory
    #[arg(long, env = "CHAT_BOT_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive conversation (default)
    Chat,
    /// Send messages in order and print each response
    Send {
        /// Messages to send
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Validate the definition and list its states
    Check,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_file(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn build_config(cli: &Cli) -> BotConfig {
    let mut config = BotConfig::default()
        .with_session_timeout(Duration::from_secs(cli.session_timeout_secs))
        .with_cleanup_interval(Duration::from_secs(cli.cleanup_interval_secs))
        .with_concurrent_access(cli.concurrent)
        .with_error_logger(|error| tracing::debug!("Bot diagnostic: {}", error));

    if let Some(dir) = &cli.session_dir {
        config = config.with_storage(Arc::new(FileSessionStorage::new(dir)));
    }
    config
}

fn trace_state_entries(bot: &Bot) {
    for state in bot.state_names() {
        bot.register_state_listener(state, |event: &ListenerEvent, _bot: &Bot| {
            if let ListenerKind::StateEntered { state } = &event.kind {
                tracing::info!("[{}] Entered state '{}'", event.user_id, state);
            }
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let definition = BotDefinition::from_file(&cli.definition)
        .with_context(|| format!("Failed to load {}", cli.definition.display()))?;
    let bot = Bot::from_definition(&definition, build_config(&cli))
        .context("Invalid bot definition")?;
    trace_state_entries(&bot);

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_interactive_chat(&bot, &cli.user).await,
        Commands::Send { messages } => send_messages(&bot, &cli.user, &messages).await,
        Commands::Check => {
            println!("{} '{}'", "Definition OK:".green().bold(), bot.config().name);
            for state in bot.state_names() {
                println!("  - {}", state);
            }
            Ok(())
        }
    };

    bot.stop().await;
    result
}

async fn send_messages(bot: &Bot, user: &str, messages: &[String]) -> anyhow::Result<()> {
    for message in messages {
        let response = bot.process_message(user, message).await?;
        println!("{} {}", "You:".cyan().bold(), message);
        println!("{} {}", "Bot:".green().bold(), response);
    }
    Ok(())
}

async fn run_interactive_chat(bot: &Bot, user: &str) -> anyhow::Result<()> {
    println!("{}", format!("Chatting with '{}'", bot.config().name).cyan().bold());
    println!("{}", "Type /quit to leave".dimmed());
    println!();

    // Greet new users with the entry message of the starting state.
    if !bot.config().has_storage() && bot.session(user).await.is_none() {
        let greeting = bot.move_to_state(user, &bot.config().starting_state).await?;
        println!("{} {}", "Bot:".green().bold(), greeting);
    }

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let Some(input) = read_line().await? else {
            break;
        };
        let input = input.trim();

        if input == "/quit" {
            println!("{}", "Goodbye!".cyan());
            break;
        }
        if input.is_empty() {
            continue;
        }

        match bot.process_message(user, input).await {
            Ok(response) => println!("{} {}", "Bot:".green().bold(), response),
            Err(e) => println!("{}", format!("Error: {}", e).red()),
        }
    }

    Ok(())
}

/// Read one line from stdin on the blocking pool; `None` at end of input.
async fn read_line() -> anyhow::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
        let mut input = String::new();
        match io::stdin().read_line(&mut input)? {
            0 => Ok(None),
            _ => Ok(Some(input)),
        }
    })
    .await??;
    Ok(line)
}
