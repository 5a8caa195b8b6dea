//! Warden control plane.
//!
//! `serve` boots the fleet core: opens the database, initializes the
//! private CA, and runs the background sweeps until shutdown. The `token`
//! subcommands let operators mint and revoke enrollment tokens; a minted
//! token's plaintext is printed exactly once and never stored.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use warden_core::tracing_init::init_tracing;
use warden_pki::{CaConfig, CertificateAuthority, FileCaStore};

use warden_control::capacity::{CapacityConfig, CapacityLedger};
use warden_control::enrollment::TokenIssuer;
use warden_control::events::BusPublisher;
use warden_control::health::{HeartbeatConfig, HeartbeatService};
use warden_control::storage::ControlDatabase;
use warden_control::sweeps::{SweepConfig, spawn_sweeps};

#[derive(Parser, Debug)]
#[command(name = "warden-control")]
#[command(version, about = "Warden control plane - fleet trust and capacity core")]
struct Args {
    /// Database file path.
    #[arg(long, env = "WARDEN_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control plane.
    Serve {
        /// Directory holding the CA key material.
        #[arg(long, env = "WARDEN_CA_DIR")]
        ca_dir: Option<PathBuf>,

        /// SPIFFE trust domain embedded in issued certificates.
        #[arg(long, env = "WARDEN_TRUST_DOMAIN", default_value = "warden.local")]
        trust_domain: String,

        /// Deployment name used in the CA subject.
        #[arg(long, env = "WARDEN_DEPLOYMENT", default_value = "Warden")]
        deployment_name: String,

        /// Client certificate validity in days.
        #[arg(long, default_value_t = 30)]
        certificate_validity_days: i64,

        /// Reservation time-to-live in seconds.
        #[arg(long, default_value_t = 300)]
        reservation_ttl: i64,

        /// Minutes of heartbeat silence before a node is marked offline.
        #[arg(long, default_value_t = 5)]
        stale_threshold_minutes: i64,
    },

    /// Mint an enrollment token. The plaintext is printed once.
    TokenIssue {
        /// Organization the enrolled node will belong to.
        #[arg(long)]
        org: String,

        /// Operator identity recorded with the token.
        #[arg(long, default_value = "operator")]
        created_by: String,

        /// Free-text label (e.g. the rack or batch being provisioned).
        #[arg(long)]
        label: String,

        /// Token validity in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },

    /// Revoke an unredeemed enrollment token by its hash.
    TokenRevoke {
        #[arg(long)]
        hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("warden_control=info", args.log_json);

    let db_path = match &args.db_path {
        Some(path) => path.clone(),
        None => default_data_dir()?.join("warden.db"),
    };
    let db = ControlDatabase::open(&db_path).await?;

    match args.command {
        Command::Serve {
            ca_dir,
            trust_domain,
            deployment_name,
            certificate_validity_days,
            reservation_ttl,
            stale_threshold_minutes,
        } => {
            serve(ServeConfig {
                db,
                ca_dir: match ca_dir {
                    Some(dir) => dir,
                    None => default_data_dir()?.join("ca"),
                },
                trust_domain,
                deployment_name,
                certificate_validity_days,
                reservation_ttl,
                stale_threshold_minutes,
            })
            .await
        }
        Command::TokenIssue {
            org,
            created_by,
            label,
            ttl,
        } => {
            let issued = TokenIssuer::new(db).issue(&org, &created_by, &label, ttl).await?;
            println!("token: {}", issued.plaintext);
            println!("hash: {}", issued.record.token_hash);
            println!("expires_at: {}", issued.record.expires_at);
            Ok(())
        }
        Command::TokenRevoke { hash } => {
            if TokenIssuer::new(db).revoke(&hash).await? {
                println!("revoked");
            } else {
                println!("no such token");
            }
            Ok(())
        }
    }
}

struct ServeConfig {
    db: ControlDatabase,
    ca_dir: PathBuf,
    trust_domain: String,
    deployment_name: String,
    certificate_validity_days: i64,
    reservation_ttl: i64,
    stale_threshold_minutes: i64,
}

async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        trust_domain = %config.trust_domain,
        "Starting warden-control"
    );

    let ca = Arc::new(CertificateAuthority::new(
        CaConfig {
            deployment_name: config.deployment_name,
            trust_domain: config.trust_domain,
            certificate_validity_days: config.certificate_validity_days,
            ..CaConfig::default()
        },
        Arc::new(FileCaStore::new(config.ca_dir)),
        Arc::new(config.db.clone()),
    ));
    ca.initialize()?;

    let events = Arc::new(BusPublisher::new(1024));
    let heartbeat = Arc::new(HeartbeatService::new(
        config.db.clone(),
        events.clone(),
        HeartbeatConfig {
            stale_threshold_minutes: config.stale_threshold_minutes,
            ..HeartbeatConfig::default()
        },
    ));
    let ledger = Arc::new(CapacityLedger::new(
        config.db,
        events,
        CapacityConfig {
            reservation_ttl_seconds: config.reservation_ttl,
        },
    ));

    let (stale_sweep, expiry_sweep) = spawn_sweeps(
        heartbeat,
        ledger,
        &SweepConfig {
            stale_node_interval: Duration::from_secs(60),
            reservation_expiry_interval: Duration::from_secs(30),
        },
    );

    info!("Warden control plane running");
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    stale_sweep.abort();
    expiry_sweep.abort();
    info!("Warden control plane stopped");
    Ok(())
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".warden"))
}
