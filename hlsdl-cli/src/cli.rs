use clap::Parser;
use hlsdl_engine::VerifyPolicy;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Segmented HLS downloader",
    long_about = "Downloads every segment of an HLS (VOD) playlist in parallel, decrypts\n\
                  AES-128 segments and joins them into a single file.\n\
                  \n\
                  Interrupted downloads can be resumed with --resume: segments already\n\
                  present in the output directory are reused after a size check."
)]
pub struct CliArgs {
    /// Playlist URL
    #[arg(required = true, help = "URL of the HLS playlist (master or media)")]
    pub url: String,

    /// Working directory for staging files and the final output
    #[arg(
        short,
        long,
        default_value = "download",
        help = "Directory for segment staging files and the joined output"
    )]
    pub output_dir: PathBuf,

    /// Number of parallel segment downloads
    #[arg(
        short,
        long,
        default_value = "4",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of segments downloaded in parallel"
    )]
    pub workers: u32,

    /// Output file name
    #[arg(
        short = 'n',
        long = "name",
        help = "Output file name (default: playlist file stem + .ts)"
    )]
    pub output_name: Option<String>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Show a progress bar
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a segment progress bar"
    )]
    pub show_progress: bool,

    /// Reuse segments from an interrupted run
    #[arg(long, help = "Resume an interrupted download from existing staging files")]
    pub resume: bool,

    /// Verify every existing segment instead of only the newest ones
    #[arg(
        long,
        requires = "resume",
        help = "With --resume, check the size of every existing segment against the server"
    )]
    pub check_all: bool,

    /// Retries for transient segment errors
    #[arg(
        long,
        default_value = "2",
        help = "Number of retries for a segment after a connection reset or timeout"
    )]
    pub retries: u32,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

impl CliArgs {
    pub fn verify_policy(&self) -> VerifyPolicy {
        if self.check_all {
            VerifyPolicy::Thorough
        } else {
            VerifyPolicy::Fast
        }
    }
}
