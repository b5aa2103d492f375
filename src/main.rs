use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use media_proxy::application::{PipelineCoordinator, ResponseBody};
use media_proxy::domain::ProxyFlags;
use media_proxy::infrastructure::{
    AppConfig, CliArgs, FetchConfig, SecureFetcher, StorageManager, TempAllocator,
    TransformDispatcher,
};
use media_proxy::presentation::{Body, Placeholder, ProxyRequest, ProxyResponse, Responder};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.log_file() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

fn create_coordinator(config: &AppConfig) -> Result<PipelineCoordinator<SecureFetcher>> {
    let fetch_config =
        FetchConfig::from_settings(&config.fetch).wrap_err("Invalid fetch settings")?;
    let transformer = TransformDispatcher::new(&config.transform);
    let temp = TempAllocator::new(config.temp_dir.clone());

    Ok(PipelineCoordinator::new(
        SecureFetcher::new(),
        fetch_config,
        transformer,
        temp,
    ))
}

async fn create_responder(config: &AppConfig) -> Result<Responder> {
    let placeholder = match &config.fallback_image {
        Some(path) => match Placeholder::load(path).await {
            Ok(placeholder) => Some(placeholder),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load fallback image");
                None
            }
        },
        None => None,
    };

    Responder::new(&config.response, placeholder).wrap_err("Invalid response header settings")
}

/// A target starting with `/` is parsed like an inbound request path.
fn resolve_target(args: &CliArgs) -> ProxyRequest {
    let mut request = if args.target.starts_with('/') {
        ProxyRequest::parse(&args.target)
    } else {
        ProxyRequest {
            url: Some(args.target.clone()).filter(|url| !url.is_empty()),
            flags: ProxyFlags::empty(),
        }
    };
    request.flags |= args.flags();
    request
}

fn report(response: &ProxyResponse) {
    eprintln!("{}", response.status);
    for (name, value) in &response.headers {
        eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
    }
}

async fn write_body(body: Body, output: Option<&Path>) -> Result<()> {
    let mut writer: Box<dyn AsyncWrite + Unpin> = match output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .wrap_err_with(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    match body {
        Body::Empty => {}
        Body::Static(bytes) | Body::Media(ResponseBody::Buffer(bytes)) => {
            writer.write_all(&bytes).await?;
        }
        Body::Media(ResponseBody::Stream(mut stream)) => {
            while let Some(chunk) = stream.next().await {
                writer.write_all(&chunk?).await?;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = media_proxy::VERSION, "Starting media-proxy");

    let coordinator = create_coordinator(&config)?;
    let responder = create_responder(&config).await?;

    let request = resolve_target(&args);
    let response = match &request.url {
        Some(url) => responder.respond(coordinator.handle(url, request.flags).await, request.flags),
        None => responder.bad_request(),
    };

    report(&response);
    let status = response.status;
    write_body(response.body, args.output.as_deref()).await?;

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
