//! fedsign binary entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fedsign::config::{AppConfig, LoggingConfig};
use fedsign::federation::{
    FederationClient, InMemoryKeyStore, KeyProvider, RawObject, generate_rsa_keypair, sign_request,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Extra configuration file layered over config/default.toml and config/local.toml
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Local actor to sign as (overrides actor.id)
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a remote object with a signed GET and print it
    Fetch {
        url: String,
    },
    /// Deliver a JSON document to a remote inbox with a signed POST
    Deliver {
        inbox: String,
        /// File holding the exact bytes to send
        file: PathBuf,
        /// Content-Type of the document
        #[arg(long, default_value = fedsign::federation::ACTIVITY_JSON)]
        content_type: String,
    },
    /// Print the headers a signed request would carry, without sending it
    Sign {
        /// GET or POST
        method: String,
        url: String,
        /// Request body to digest
        #[arg(long)]
        body: Option<PathBuf>,
    },
    /// Generate an RSA keypair for a local actor
    GenerateKey {
        /// Where to write the PKCS#8 private key
        out: PathBuf,
        #[arg(long, default_value_t = 4096)]
        bits: usize,
    },
}

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from the `[logging]` section
/// 3. Build the key store and federation client
/// 4. Run the requested command
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::GenerateKey { out, bits } = &cli.command {
        init_tracing(&LoggingConfig::default());
        return generate_key(out, *bits);
    }

    // 1. Load configuration
    let config = AppConfig::load_with_file(cli.config.as_deref())?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    fedsign::metrics::init_metrics();
    tracing::info!(
        base_url = %config.instance.base_url,
        user_agent = %config.instance.user_agent,
        "Configuration loaded"
    );

    // 3. Key store with the configured actor
    let actor_id = cli
        .actor
        .clone()
        .or_else(|| config.actor.id.clone())
        .context("No actor configured; set actor.id or pass --actor")?;
    let key_path = config
        .actor
        .private_key_path
        .clone()
        .context("actor.private_key_path is not configured")?;
    let private_key_pem = std::fs::read_to_string(&key_path)
        .with_context(|| format!("Failed to read private key {}", key_path.display()))?;

    let key_store = InMemoryKeyStore::new(config.instance.base_url.clone());
    key_store.insert(actor_id.clone(), private_key_pem).await;

    // 4. Run command
    match cli.command {
        Command::Fetch { url } => {
            let client = FederationClient::from_config(&config, Arc::new(key_store))?;
            let object: serde_json::Value = client.fetch_signed(&url, &actor_id).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        Command::Deliver {
            inbox,
            file,
            content_type,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let object = RawObject {
                content_type,
                bytes: bytes.into(),
            };
            let client = FederationClient::from_config(&config, Arc::new(key_store))?;
            client.deliver(&actor_id, &inbox, &object).await?;
            tracing::info!(inbox = %inbox, "Delivery finished");
        }
        Command::Sign { method, url, body } => {
            let method: http::Method = method.to_uppercase().parse()?;
            let body = match body {
                Some(path) => Some(
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let keypair = key_store.keypair(&actor_id).await?;
            let signed = sign_request(
                &method,
                &url,
                body.as_deref(),
                keypair.signing_key(),
                &[("User-Agent", config.instance.user_agent.as_str())],
            )?;
            for (name, value) in signed.iter() {
                println!("{}: {}", name, value);
            }
        }
        Command::GenerateKey { .. } => bail!("generate-key is handled before configuration"),
    }

    Ok(())
}

/// `RUST_LOG` overrides `logging.level` when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn generate_key(out: &Path, bits: usize) -> anyhow::Result<()> {
    if out.exists() {
        bail!("{} already exists; refusing to overwrite", out.display());
    }

    let keys = generate_rsa_keypair(bits)?;
    std::fs::write(out, keys.private_key_pem.as_bytes())
        .with_context(|| format!("Failed to write {}", out.display()))?;

    tracing::info!(path = %out.display(), bits, "Private key written");
    println!("{}", keys.public_key_pem);
    Ok(())
}
