mod client;
mod config;
mod controller;
mod conversion;
mod error;
mod pipelines;
mod routes;
mod storage;
mod upload;
mod utils;


#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::{EndpointExt, Route, Server};
use poem_openapi::OpenApiService;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use crate::client::{ConverterClient, LookupOutcome};
use crate::config::RuntimeConfig;
use crate::controller::ConversionController;
use crate::conversion::{ConversionService, OnlineConvertClient, ServiceCredentials};
use crate::pipelines::{ConversionPipeline, JobSettings, PollPolicy, StatusTracker};
use crate::routes::ConverterApi;
use crate::storage::StorageBackend;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// The most conversion states kept around for lookups.
const STATUS_CAPACITY: u64 = 10_000;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Args {
    #[clap(long, env, default_value = "info")]
    /// The log level filter, `RUST_LOG` takes precedence if set.
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the upload and conversion service.
    Run(RunArgs),

    /// Uploads an image to be converted into `<username>.pdf`.
    Upload {
        #[clap(long, env = "BUNNIMAGE_API", default_value = "http://127.0.0.1:8000/api")]
        /// The base URL of the service's API.
        api: String,

        #[clap(short, long)]
        /// The username the PDF will be named after.
        username: String,

        /// The image to upload.
        file: PathBuf,
    },

    /// Checks whether `<username>.pdf` is ready and optionally downloads it.
    Download {
        #[clap(long, env = "BUNNIMAGE_API", default_value = "http://127.0.0.1:8000/api")]
        /// The base URL of the service's API.
        api: String,

        #[clap(short, long)]
        /// The username the PDF is named after.
        username: String,

        #[clap(short, long)]
        /// Where to save the PDF if it is ready.
        output: Option<PathBuf>,

        #[clap(long)]
        /// Ask the service to delete the PDF once it has been saved to `--output`.
        delete: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    #[clap(long, default_value = "127.0.0.1", env)]
    /// The binding host address of the server.
    pub host: String,

    #[clap(long, default_value = "8000", env)]
    pub port: u16,

    #[clap(long, env)]
    /// The external URL that would be used to access the server if applicable.
    ///
    /// This only affects the documentation.
    pub docs_url: Option<String>,

    #[clap(long, env, default_value = "config.yaml")]
    /// The file path to a given config file.
    ///
    /// This can be either a JSON formatted config or YAML.
    pub config_file: PathBuf,

    #[clap(long, env = "CONVERT_API_KEY", hide_env_values = true)]
    /// The API key of the conversion service.
    pub api_key: String,

    #[clap(long, env = "STORAGE_ACCOUNT_KEY", hide_env_values = true)]
    /// The key of the storage account the conversion service reads images from.
    pub storage_account_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!(
            "{}={},poem=info",
            env!("CARGO_CRATE_NAME"),
            args.log_level,
        )));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match args.command {
        Command::Run(run_args) => run_server(run_args).await,
        Command::Upload { api, username, file } => run_upload(&api, &username, &file).await,
        Command::Download { api, username, output, delete } => {
            run_download(&api, &username, output, delete).await
        },
    }
}

async fn run_server(args: RunArgs) -> Result<()> {
    config::init(&args.config_file).await?;
    let cfg = config::config();

    let storage: Arc<dyn StorageBackend> = cfg.backend.connect().await?;
    let credentials = ServiceCredentials {
        api_key: args.api_key,
        account_key: args.storage_account_key,
    };
    let service: Arc<dyn ConversionService> = Arc::new(OnlineConvertClient::new(
        &cfg.conversion.endpoint,
        &credentials,
        cfg.conversion.request_timeout(),
    )?);

    let download_base_url = cfg
        .download_base_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}/api/pdfs", args.host, args.port));

    let pipeline = build_pipeline(cfg, storage.clone(), service, credentials);
    let controller = ConversionController::new(storage, pipeline, download_base_url);

    let bind = format!("{}:{}", args.host, args.port);
    let addr: SocketAddr = bind.parse()?;
    let docs_url = args
        .docs_url
        .unwrap_or_else(|| format!("http://{}", bind));

    let api_service = OpenApiService::new(
        ConverterApi::new(Arc::new(controller)),
        "Bunnimage API",
        env!("CARGO_PKG_VERSION"),
    )
    .description(
        "Upload an image, have it converted to a PDF in the background \
        and collect the PDF by username.",
    )
    .server(format!("{}/api", docs_url));

    let ui = api_service.redoc();
    let spec = api_service.spec_endpoint();

    let app = Route::new()
        .nest("/api", api_service)
        .nest("/docs", ui)
        .at("/spec", spec)
        .with(Tracing);

    info!("Bunnimage is now ready to serve requests @ http://{}", &addr);
    Server::new(TcpListener::bind(addr))
        .run(app)
        .await?;

    Ok(())
}

/// Wires the conversion pipeline from the runtime config.
pub fn build_pipeline(
    cfg: &RuntimeConfig,
    storage: Arc<dyn StorageBackend>,
    service: Arc<dyn ConversionService>,
    credentials: ServiceCredentials,
) -> Arc<ConversionPipeline> {
    let limiter = cfg
        .max_concurrency
        .map(Semaphore::new)
        .map(Arc::new);

    let tracker = StatusTracker::new(cfg.status_retention(), STATUS_CAPACITY);
    let settings = JobSettings {
        target: cfg.conversion.target.clone(),
        source: cfg.storage_account.source.clone(),
        account_name: cfg.storage_account.name.clone(),
    };
    let policy = PollPolicy {
        interval: cfg.conversion.poll_interval(),
        max_attempts: cfg.conversion.max_poll_attempts,
    };

    Arc::new(ConversionPipeline::new(
        service,
        storage,
        tracker,
        settings,
        credentials,
        policy,
        limiter,
    ))
}

async fn run_upload(api: &str, username: &str, file: &Path) -> Result<()> {
    let client = ConverterClient::new(api);
    let receipt = client.upload_file(username, file).await?;

    if !receipt.success {
        return Err(anyhow!("the service did not accept {:?}", file));
    }

    info!(
        "Stored {} ({}, {} bytes, crc32 {:08x}) request {}, use \"{}\" to receive your pdf",
        receipt.name, receipt.content_type, receipt.size, receipt.checksum, receipt.request_id, username,
    );

    Ok(())
}

async fn run_download(
    api: &str,
    username: &str,
    output: Option<PathBuf>,
    delete: bool,
) -> Result<()> {
    let client = ConverterClient::new(api);
    let outcome = client.lookup(username).await?;
    info!("{}", outcome.describe(username));

    match outcome {
        LookupOutcome::NotReady => Ok(()),
        LookupOutcome::Failed { detail } => Err(anyhow!("conversion failed: {}", detail)),
        LookupOutcome::Ready { download_uri } => {
            match output {
                Some(output) => {
                    client.save_pdf(username, &download_uri, &output, delete).await?;
                },
                None if delete => warn!("Not deleting {}.pdf, it was never downloaded, pass --output to save it", username),
                None => {},
            }

            Ok(())
        },
    }
}
