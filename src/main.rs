use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use reqwest::Client;
use tracing_subscriber::EnvFilter;

use openreview_harvester::layers::discovery::{
    fetch_submissions, OpenReviewClient, SubmissionStatus, DEFAULT_BASE_URL,
};
use openreview_harvester::layers::download::{DownloadJob, Downloader};
use openreview_harvester::layers::matching::{all_of_pattern, any_of_pattern, search, FieldSelector};
use openreview_harvester::layers::normalize::normalize;

const DEFAULT_DOWNLOAD_DIR: &str = "./ICLR2025_SafeRL";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatchMode {
    /// Every keyword must appear in the same field
    All,
    /// Any keyword is enough
    Any,
}

/// Fetch a venue's OpenReview submissions and download the PDFs matching some keywords
#[derive(Parser)]
#[command(name = "openreview-harvester", version, about)]
struct Cli {
    /// Venue group id
    #[arg(long, default_value = "ICLR.cc/2025/Conference")]
    venue: String,

    /// Submission subset: all, accepted, under_review, withdrawn or desk_rejected
    #[arg(long, default_value = "all")]
    status: SubmissionStatus,

    /// Keyword to search for (repeatable, regex syntax unless --literal)
    #[arg(short, long = "keyword", default_values = ["reinforcement learning", "safe"])]
    keywords: Vec<String>,

    #[arg(long, value_enum, default_value_t = MatchMode::All)]
    match_mode: MatchMode,

    /// `all` or a comma separated list of fields, e.g. `title,abstract`
    #[arg(long, default_value = "all")]
    fields: FieldSelector,

    /// Join the keywords into one case-sensitive phrase instead of a regex
    #[arg(long)]
    literal: bool,

    /// Download folder [env: DOWNLOAD_DIR]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the matches as JSON without downloading
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pattern(&self) -> (String, bool) {
        if self.literal {
            return (self.keywords.join(" "), false);
        }
        let pattern = match self.match_mode {
            MatchMode::All => all_of_pattern(&self.keywords),
            MatchMode::Any => any_of_pattern(&self.keywords),
        };
        (pattern, true)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "openreview_harvester=debug"
    } else {
        "openreview_harvester=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 0. Load Configuration
    if !Path::new(".env").exists() && Path::new(".env.example").exists() {
        println!("Creating .env from .env.example...");
        std::fs::copy(".env.example", ".env")?;
    }
    dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let base_url = non_empty_var("OPENREVIEW_BASEURL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let download_dir = cli
        .output
        .clone()
        .or_else(|| non_empty_var("DOWNLOAD_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));

    // One HTTP client shared by the API and the downloader
    let http = Client::new();

    // 1. Fetch
    println!("--- Step 1: Fetch ---");
    let mut client = OpenReviewClient::new(http.clone(), base_url);
    if let (Some(user), Some(pass)) = (
        non_empty_var("OPENREVIEW_USERNAME"),
        non_empty_var("OPENREVIEW_PASSWORD"),
    ) {
        client.login(&user, &pass).await.context("OpenReview login failed")?;
    }
    let raw = fetch_submissions(&client, &cli.venue, cli.status).await?;
    println!("Fetched {} {} submissions from {}.", raw.len(), cli.status, cli.venue);

    // 2. Normalize
    println!("\n--- Step 2: Normalize ---");
    let records = raw
        .iter()
        .map(normalize)
        .collect::<Result<Vec<_>, _>>()
        .context("Submission metadata is incomplete")?;
    println!("Normalized {} records.", records.len());

    // 3. Search
    println!("\n--- Step 3: Search ---");
    let (pattern, is_regex) = cli.pattern();
    tracing::info!("Searching {:?} for {:?} (regex: {})", cli.fields, pattern, is_regex);
    let matches = search(records, &pattern, &cli.fields, is_regex)?;
    println!("{} submissions match.", matches.len());

    if matches.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }
    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    // 4. Download
    println!("\n--- Step 4: Download ---");
    let downloader = Downloader::new(http);
    let jobs: Vec<DownloadJob> = matches.iter().map(DownloadJob::from).collect();
    let summary = downloader.download_all(&jobs, &download_dir).await;

    println!(
        "Downloaded {} of {} papers to {:?}.",
        summary.saved.len(),
        jobs.len(),
        download_dir
    );
    for (_, cause) in &summary.failed {
        println!("  {}", cause);
    }

    Ok(())
}
