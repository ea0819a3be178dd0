mod debounce;
mod dispatcher;
mod identity;
mod reply;

use clap::{Parser, Subcommand};
use debounce::ReplyTimer;
use dispatcher::Dispatcher;
use doppel_channels::whatsapp::WhatsAppTransport;
use doppel_core::{
    config::{self, shellexpand, Config},
    persona::{install_bundled_persona, Persona},
    traits::{Provider, Transport},
};
use doppel_memory::{sanitize_phone, ContactBook, History};
use doppel_providers::OllamaProvider;
use identity::{IdentityResolver, TrackedIdentity};
use reply::ReplyComposer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser)]
#[command(
    name = "doppel",
    version,
    about = "Doppel — single-target persona autoresponder"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the autoresponder.
    Start,
    /// Check config, contact book, and backend availability.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => start(&cli.config).await,
        Commands::Status => status(&cli.config).await,
    }
}

async fn start(config_path: &str) -> anyhow::Result<()> {
    let cfg = config::load(config_path)?;

    // Console + daily rolling file logging under {data_dir}/logs.
    let logs_dir = format!("{}/logs", shellexpand(&cfg.doppel.data_dir));
    std::fs::create_dir_all(&logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "doppel.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.doppel.log_level)),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    install_bundled_persona(&cfg.doppel.data_dir);
    let persona = Persona::load(&cfg.doppel.data_dir);

    // Resolve the tracked target from the contact book.
    if cfg.target.phone.is_empty() {
        anyhow::bail!(
            "no target phone configured. Set [target].phone in {config_path} \
             or the TARGET_PHONE env var."
        );
    }
    let phone = sanitize_phone(&cfg.target.phone);
    let contacts_path = shellexpand(&cfg.target.contacts_path);
    let book = ContactBook::load(&contacts_path)?;
    let record = book
        .find_by_phone(&phone)
        .ok_or_else(|| anyhow::anyhow!("phone {phone} not found in {contacts_path}"))?
        .clone();

    info!("target: {} ({})", record.name, record.jid);
    if record.lid.is_none() {
        info!(
            "alias not yet known — send '{} hi' to the target to latch it manually",
            cfg.target.trigger_prefix
        );
    }

    let identity = TrackedIdentity::from_record(&record);
    let resolver = IdentityResolver::new(identity, book, &cfg.target);

    // Backend.
    let provider = build_provider(&cfg)?;
    if !provider.is_available().await {
        anyhow::bail!(
            "provider '{}' is not available. Is the Ollama server running?",
            provider.name()
        );
    }

    // Transport.
    let whatsapp_enabled = cfg
        .channel
        .whatsapp
        .as_ref()
        .map(|w| w.enabled)
        .unwrap_or(true);
    if !whatsapp_enabled {
        anyhow::bail!("the whatsapp channel is disabled in {config_path}");
    }
    let transport: Arc<dyn Transport> = Arc::new(WhatsAppTransport::new(&cfg.doppel.data_dir));

    let history = History::new(cfg.reply.max_context_turns);
    let composer = ReplyComposer::new(persona, &cfg.reply);
    let timer = ReplyTimer::new(Duration::from_secs(cfg.reply.debounce_secs));

    let dispatcher = Arc::new(Dispatcher::new(
        transport,
        provider,
        resolver,
        history,
        composer,
        timer,
        Duration::from_secs(cfg.reply.generation_timeout_secs),
    ));

    println!("Doppel — starting as {}...", cfg.doppel.name);
    dispatcher.run().await
}

async fn status(config_path: &str) -> anyhow::Result<()> {
    let cfg = config::load(config_path)?;
    println!("Doppel — Status Check\n");
    println!("Config: {config_path}");
    println!("Data dir: {}", cfg.doppel.data_dir);
    println!();

    let provider = build_provider(&cfg)?;
    println!(
        "  {}: {}",
        provider.name(),
        if provider.is_available().await {
            "available"
        } else {
            "not reachable"
        }
    );

    let contacts_path = shellexpand(&cfg.target.contacts_path);
    match ContactBook::load(&contacts_path) {
        Ok(book) => match book.find_by_phone(&sanitize_phone(&cfg.target.phone)) {
            Some(c) => println!(
                "  target: {} ({}, alias: {})",
                c.name,
                c.jid,
                c.lid.as_deref().unwrap_or("not yet discovered")
            ),
            None => println!("  target: phone '{}' not in contact book", cfg.target.phone),
        },
        Err(e) => println!("  contact book: {e}"),
    }

    let session_db = format!(
        "{}/whatsapp_session/session.db",
        shellexpand(&cfg.doppel.data_dir)
    );
    println!(
        "  whatsapp: {}",
        if std::path::Path::new(&session_db).exists() {
            "paired"
        } else {
            "not paired (QR code on first start)"
        }
    );

    Ok(())
}

/// Build the configured provider.
fn build_provider(cfg: &Config) -> anyhow::Result<Arc<dyn Provider>> {
    match cfg.provider.default.as_str() {
        "ollama" => {
            let oc = cfg.provider.ollama.clone().unwrap_or_default();
            Ok(Arc::new(OllamaProvider::from_config(&oc)))
        }
        other => anyhow::bail!("unsupported provider: {other}"),
    }
}
