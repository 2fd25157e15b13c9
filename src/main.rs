//! # Main — CLI Entry Point
//!
//! Routes subcommands to the dashboard server, one-shot pipeline runs and
//! maintenance tools. Every option can also come from the environment (a
//! `.env` file is loaded first).
//!
//! ## Subcommands
//!
//! - `serve` — HTTP + WebSocket dashboard
//! - `search` — one full scrape → verify job from the terminal
//! - `scrape` — collect candidates only, printed as JSON lines
//! - `verify` — RDAP availability for names given on the command line or in a file
//! - `account add|reset|list` — manage the account pool
//! - `proxies check` — probe every configured proxy

mod cli;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dropscout::scraper::DEFAULT_SITE_URL;
use dropscout::verify::DEFAULT_RDAP_URL;

#[derive(Parser)]
#[command(
    name = "dropscout",
    about = "Find recently deleted .com domains and check whether they can be registered"
)]
struct Cli {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://domains.db")]
    database_url: String,

    /// W3C WebDriver endpoint (chromedriver)
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    webdriver_url: String,

    /// Run the browser without a window
    #[arg(long, env = "HEADLESS", default_value_t = true, action = ArgAction::Set)]
    headless: bool,

    /// RDAP base URL for .com lookups
    #[arg(long, env = "RDAP_URL", default_value = DEFAULT_RDAP_URL)]
    rdap_url: String,

    /// Reject domains younger than this many years (unknown ages pass)
    #[arg(long, env = "MIN_AGE_YEARS", default_value_t = 5)]
    min_age_years: u32,

    /// Candidates collected per requested domain
    #[arg(long, env = "OVERFETCH_MULTIPLIER", default_value_t = 3)]
    overfetch_multiplier: usize,

    /// Pause between RDAP queries, in milliseconds
    #[arg(long, env = "VERIFY_DELAY_MS", default_value_t = 1000)]
    verify_delay_ms: u64,

    /// Proxy list, one endpoint per line
    #[arg(long, env = "PROXY_FILE", default_value = "proxies.txt")]
    proxy_file: PathBuf,

    /// Single proxy used when the proxy file is missing
    #[arg(long, env = "PROXY_URL")]
    proxy_url: Option<String>,

    /// Listing-site username for `scrape`
    #[arg(long, env = "ED_USERNAME")]
    ed_username: Option<String>,

    /// Listing-site password for `scrape`
    #[arg(long, env = "ED_PASSWORD", hide_env_values = true)]
    ed_password: Option<String>,

    /// Legacy session file used when no stored session is available
    #[arg(long, env = "AUTH_STATE_FILE", default_value = "auth.json")]
    auth_state_file: PathBuf,

    /// Listing site base URL
    #[arg(long, env = "SITE_URL", default_value = DEFAULT_SITE_URL)]
    site_url: String,

    /// First listing page to scrape
    #[arg(long, env = "START_PAGE", default_value_t = 2)]
    start_page: u32,

    /// Listing pages to scrape per run
    #[arg(long, env = "MAX_PAGES", default_value_t = 2)]
    max_pages: u32,

    /// Directory for diagnostic screenshots
    #[arg(long, env = "DIAGNOSTICS_DIR")]
    diagnostics_dir: Option<PathBuf>,

    /// Extra stop-terms for the content filter (comma separated)
    #[arg(long, env = "STOP_TERMS", value_delimiter = ',')]
    stop_terms: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,
        /// Serve this directory as the fallback route (operator UI)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Run one search job and print its progress
    Search {
        /// Available domains wanted
        #[arg(long, default_value_t = 10)]
        target: usize,
        /// Account whose stored session is used
        #[arg(long)]
        username: String,
    },
    /// Collect candidates without verifying them
    Scrape {
        /// Candidates to collect
        #[arg(long, default_value_t = 30)]
        target: usize,
    },
    /// Check availability of domain names
    Verify {
        /// Names to check
        names: Vec<String>,
        /// File with one name per line
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Manage the account pool
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Inspect the proxy pool
    Proxies {
        #[command(subcommand)]
        action: ProxyAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Seed an account
    Add {
        username: String,
        #[arg(long, env = "ED_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Mark an account active again after a ban or expiry
    Reset { username: String },
    /// List all accounts
    List,
}

#[derive(Subcommand)]
enum ProxyAction {
    /// Probe every configured proxy
    Check,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match &cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => rt.block_on(cli::run_serve(&cli, *host, *port, static_dir.as_deref())),
        Commands::Search { target, username } => {
            rt.block_on(cli::run_search(&cli, *target, username))
        }
        Commands::Scrape { target } => rt.block_on(cli::run_scrape(&cli, *target)),
        Commands::Verify { names, file } => {
            rt.block_on(cli::run_verify(&cli, names, file.as_deref()))
        }
        Commands::Account { action } => rt.block_on(cli::run_account(&cli, action)),
        Commands::Proxies { action } => rt.block_on(cli::run_proxies(&cli, action)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_uses_defaults() {
        let cli = Cli::try_parse_from(["dropscout", "search", "--username", "scout"]).unwrap();
        assert_eq!(cli.min_age_years, 5);
        assert_eq!(cli.start_page, 2);
        assert!(cli.headless);
        match cli.command {
            Commands::Search { target, username } => {
                assert_eq!(target, 10);
                assert_eq!(username, "scout");
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn stop_terms_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "dropscout",
            "--stop-terms",
            "crypto,loan",
            "--headless",
            "false",
            "verify",
            "quietlibrary.com",
        ])
        .unwrap();
        assert_eq!(cli.stop_terms, vec!["crypto", "loan"]);
        assert!(!cli.headless);
    }

    #[test]
    fn search_requires_username() {
        assert!(Cli::try_parse_from(["dropscout", "search"]).is_err());
    }
}
