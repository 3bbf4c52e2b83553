use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsdl_engine::{
    DownloaderConfig, HlsDownloader, NoopProgress, ProgressReporter, ProxyAuth, ProxyConfig,
    ProxyType,
};
use mimalloc::MiMalloc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::SegmentProgress;
use utils::{output_name_from_url, parse_headers};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("hlsdl.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("hlsdl - segmented HLS downloader");
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let proxy_config = proxy_from_args(&args)?;

    let download_config = {
        let builder = DownloaderConfig::builder()
            .with_timeout(Duration::from_secs(args.timeout))
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_headers(parse_headers(&args.headers));

        match proxy_config {
            Some(proxy) => builder.with_proxy(proxy),
            None => builder.with_system_proxy(!args.no_proxy),
        }
        .build()
    };

    let output_name = match &args.output_name {
        Some(name) => name.clone(),
        None => output_name_from_url(&args.url)?,
    };

    let progress: Arc<dyn ProgressReporter> = if args.show_progress {
        Arc::new(SegmentProgress::new())
    } else {
        Arc::new(NoopProgress)
    };

    let downloader = HlsDownloader::builder()
        .base_config(download_config)
        .working_dir(&args.output_dir)
        .workers(args.workers as usize)
        .output_filename(output_name)
        .resume(args.resume)
        .verify(args.verify_policy())
        .segment_retry_count(args.retries)
        .progress(progress)
        .build()?;

    let path = downloader.download(&args.url).await?;
    info!(path = %path.display(), "Download finished");
    println!("{}", path.display());
    Ok(())
}

/// Explicit proxy settings, `None` when no proxy is requested or when
/// `--no-proxy` overrides everything else.
fn proxy_from_args(args: &CliArgs) -> Result<Option<ProxyConfig>, AppError> {
    if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        return Ok(None);
    }
    let Some(proxy_url) = args.proxy.as_ref() else {
        return Ok(None);
    };

    let proxy_type = match args.proxy_type.as_str() {
        "http" => ProxyType::Http,
        "https" => ProxyType::Https,
        "socks5" => ProxyType::Socks5,
        "all" => ProxyType::All,
        other => {
            return Err(AppError::InvalidInput(format!(
                "Invalid proxy type: '{other}'"
            )));
        }
    };

    // Configure proxy authentication if both username and password are provided
    let auth = match (&args.proxy_user, &args.proxy_pass) {
        (Some(username), Some(password)) => Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    info!(
        proxy_url = %proxy_url,
        proxy_type = ?proxy_type,
        has_auth = auth.is_some(),
        "Using explicit proxy configuration for downloads"
    );

    Ok(Some(ProxyConfig {
        url: proxy_url.clone(),
        proxy_type,
        auth,
    }))
}
