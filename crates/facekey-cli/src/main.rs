use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facekey_core::{
    decide, AuthDecision, DirectoryPersistence, EmbeddingStore, EuclideanMatcher, Matcher,
    Persistence, DEFAULT_MATCH_THRESHOLD, DEFAULT_STORE_KEY,
};
use std::path::PathBuf;
use std::process::ExitCode;

// D-Bus proxy: `#[zbus::proxy]` generates `FaceKeyProxy` (async).
#[zbus::proxy(
    interface = "org.facekey.FaceKey1",
    default_service = "org.facekey.FaceKey1",
    default_path = "/org/facekey/FaceKey1"
)]
trait FaceKey {
    async fn register(&self, identity: &str) -> zbus::Result<u32>;
    async fn authenticate(&self) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<Vec<String>>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facekey", about = "facekey face registration and authentication CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a face and register it under a name
    Register {
        /// Name to enroll the face under (e.g., "alice")
        name: String,
    },
    /// Capture a face and check it against registered faces
    Authenticate,
    /// List registered names
    List,
    /// Show daemon status
    Status,
    /// Match a descriptor file against a store without the daemon
    Match {
        /// Descriptor JSON: an array of numbers or {"descriptor": [...]}
        #[arg(long)]
        probe: PathBuf,
        /// Store directory (default: $XDG_DATA_HOME/facekey)
        #[arg(long)]
        store_dir: Option<PathBuf>,
        /// Store key inside the directory
        #[arg(long, default_value = DEFAULT_STORE_KEY)]
        store_key: String,
        /// Accept when the distance is strictly below this value
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register { name } => {
            let proxy = connect().await?;
            let samples = proxy
                .register(&name)
                .await
                .with_context(|| format!("failed to register face for {name}"))?;
            println!("Face registered for {}! ({samples} sample(s) enrolled)", name.trim());
        }
        Commands::Authenticate => {
            let proxy = connect().await?;
            let body = proxy.authenticate().await.context("authentication failed")?;
            let reply: serde_json::Value =
                serde_json::from_str(&body).context("daemon returned malformed reply")?;
            if reply["accepted"].as_bool().unwrap_or(false) {
                let name = reply["identity"].as_str().unwrap_or_default();
                println!("Face matched for {name}. Welcome!");
            } else {
                println!("Face not recognized or distance too high.");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List => {
            let proxy = connect().await?;
            let names = proxy.list_identities().await?;
            print_names(&names);
        }
        Commands::Status => match connect().await {
            Ok(proxy) => {
                let body = proxy.status().await?;
                let status: serde_json::Value = serde_json::from_str(&body)?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Err(e) => {
                println!("facekeyd: not connected ({e:#})");
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Match {
            probe,
            store_dir,
            store_key,
            threshold,
        } => {
            let text = std::fs::read_to_string(&probe)
                .with_context(|| format!("failed to read probe {}", probe.display()))?;
            let persistence = DirectoryPersistence::new(store_dir.unwrap_or_else(default_store_dir));
            let decision = match_offline(&text, &persistence, &store_key, threshold)?;
            match decision {
                AuthDecision::Accept { identity, distance } => {
                    println!("Face matched for {identity} (distance {distance:.4}).");
                }
                AuthDecision::Reject { best } => {
                    match best.identity {
                        Some(name) => println!(
                            "Face not recognized: closest is {name} at distance {:.4} (threshold {threshold}).",
                            best.distance
                        ),
                        None => println!("Face not recognized: no faces registered."),
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn connect() -> Result<FaceKeyProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = FaceKeyProxy::new(&conn)
        .await
        .context("failed to reach facekeyd")?;
    tracing::debug!("connected to facekeyd");
    Ok(proxy)
}

fn print_names(names: &[String]) {
    if names.is_empty() {
        println!("No faces registered");
        return;
    }
    println!("Registered names:");
    for name in names {
        println!("{name}");
    }
}

fn default_store_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facekey")
}

/// Run the matcher and decision rule against a stored gallery.
fn match_offline<P: Persistence + ?Sized>(
    probe_text: &str,
    persistence: &P,
    store_key: &str,
    threshold: f32,
) -> Result<AuthDecision> {
    let Some(probe) = facekey_capture::parse_descriptor(probe_text)? else {
        bail!("probe contains no face descriptor");
    };
    let store = EmbeddingStore::load(persistence, store_key);
    let best = EuclideanMatcher.find_best_match(&store, &probe)?;
    Ok(decide(best, threshold))
}
