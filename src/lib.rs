//! Cardia - clinical patient records with heart-disease prediction
//!
//! Stores patient clinical attributes in PostgreSQL and exposes a REST
//! surface to manage them, plus prediction endpoints that run a pre-trained
//! classifier over a patient's encoded features and persist the label.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod api;
pub mod cli;
pub mod config;
pub mod ml;
pub mod patient;
pub mod store;

use config::Config;
use ml::{ClassifierEngine, PredictionService};
use store::{PatientStore, PgPatientStore};

#[derive(Parser)]
#[command(name = "cardia")]
#[command(about = "Cardia - clinical patient records with heart-disease prediction", long_about = None)]
pub struct Cli {
    /// Path to a TOML or JSON configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the service (default)
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "cardia.toml")]
        output: String,
    },
    /// Check server status
    Status {
        /// Host to connect to
        #[arg(long, default_value = "localhost:8000")]
        host: String,
    },
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    if let Err(errors) = config.validate() {
        return Err(format!("Invalid configuration: {}", errors.join("; ")).into());
    }

    // Initialize Logging/Tracing
    let level = config
        .logging
        .level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    match cli.command {
        Some(Commands::Init { output }) => {
            cli::run_init(output).await?;
        }
        Some(Commands::Status { host }) => {
            cli::run_status(host).await?;
        }
        Some(Commands::Start { port }) => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            start_server(config).await?;
        }
        None => {
            start_server(config).await?;
        }
    }

    Ok(())
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Cardia clinical data service...");

    // Patient store (PostgreSQL) - schema is bootstrapped on connect.
    let store: Arc<dyn PatientStore> =
        Arc::new(PgPatientStore::connect(&config.database).await?);

    // Classifier - loaded lazily and cached; a missing artifact surfaces as
    // 503 on prediction routes, not as a startup failure.
    let classifier = Arc::new(ClassifierEngine::new(
        &config.model.artifact_path,
        Duration::from_millis(config.model.load_timeout_ms),
    ));
    match classifier.get().await {
        Ok(model) => info!(
            "Classifier ready ({} features)",
            model.coefficients.len()
        ),
        Err(e) => warn!("Classifier not loaded yet: {}", e),
    }

    let service = Arc::new(PredictionService::new(store.clone(), classifier.clone()));

    let state = api::AppState {
        store,
        service,
        classifier,
        max_page_size: config.server.max_page_size,
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
    };
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Cardia listening on {}", addr);
    info!("API Endpoints:");
    info!("  - Patients: http://{}/patients/", addr);
    info!("  - Predict: http://{}/predict/{{patient_id}}", addr);
    info!("  - Batch predict: http://{}/predict-batch/", addr);
    info!("  - Health: http://{}/health", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
