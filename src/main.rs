use anyhow::Context;
use clap::{ArgGroup, Parser};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use feed_service::{
    validate_selector, ConsoleEmitter, FeedEmitter, Pacer, PollScheduler, TargetResolver,
    TokioSleeper,
};
use tweetfeed_core::{
    report_error, AppConfig, CoreError, ErrorExt, KeywordExpression, SystemClock, TargetSelector,
};
use twitter_client::{Credentials, RateBudget, TwitterApi, TwitterApiClient};

#[derive(Parser, Debug)]
#[command(name = "tweetfeed")]
#[command(version)]
#[command(about = "Stream posts from followees, a list or a file of accounts, filtered by keyword")]
#[command(long_about = "\
tweetfeed - keyword-filtered post feed

Polls the timelines of a set of accounts within the platform's rate limits
and prints every new post that matches the keyword expression.

EXAMPLES:
    tweetfeed --list_name rustaceans --keyword_of_csv_format \"Google Docs, Google Drive\"
    tweetfeed -f following.csv --header_line_num 0

KEYWORDS:
    Spaces mean AND (Google AND Docs), commas mean OR.
    An empty expression matches every post.

CREDENTIALS:
    TWITTER_BEARER_TOKEN, or TWITTER_CLIENT_ID and TWITTER_CLIENT_SECRET.
    Selecting a list by name also needs TWITTER_OWNER_USER_ID.")]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .multiple(false)
        .args(["user_id_for_followees", "list_id", "list_name", "following_user_file_path"]),
))]
struct Cli {
    /// Stream posts from the accounts this user follows
    #[arg(short = 'u', long = "user_id_for_followees", value_name = "USER_ID")]
    user_id_for_followees: Option<String>,

    /// Stream posts from the members of this list
    #[arg(short = 'l', long = "list_id", value_name = "LIST_ID")]
    list_id: Option<String>,

    /// Stream posts from the members of the owner's list with this name
    #[arg(short = 'n', long = "list_name", value_name = "NAME")]
    list_name: Option<String>,

    /// Stream posts from the accounts listed in this csv file
    #[arg(short = 'f', long = "following_user_file_path", value_name = "PATH")]
    following_user_file_path: Option<String>,

    /// Keyword expression, e.g. "Google Docs, Google Drive"
    #[arg(short = 'k', long = "keyword_of_csv_format", default_value = "")]
    keyword_of_csv_format: String,

    /// Header line of the csv file (0: no header, N: line N is the header)
    #[arg(
        short = 'H',
        long = "header_line_num",
        default_value_t = 1,
        allow_negative_numbers = true
    )]
    header_line_num: i64,

    /// Configuration file (defaults to ./tweetfeed.toml when present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn selector(&self) -> Option<TargetSelector> {
        if let Some(id) = &self.user_id_for_followees {
            Some(TargetSelector::AccountId(id.clone()))
        } else if let Some(id) = &self.list_id {
            Some(TargetSelector::ListId(id.clone()))
        } else if let Some(name) = &self.list_name {
            Some(TargetSelector::ListName(name.clone()))
        } else {
            self.following_user_file_path
                .as_ref()
                .map(|path| TargetSelector::FilePath(path.clone()))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Starting tweetfeed {}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<CoreError>() {
            Some(CoreError::Interrupted) => {
                info!("Interrupted, exiting");
                ExitCode::SUCCESS
            }
            Some(core_error) => {
                report_error(core_error);
                eprintln!("Error: {}", core_error.user_friendly_message());
                ExitCode::FAILURE
            }
            None => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let selector = cli
        .selector()
        .context("one of the target selectors is required")?;

    if let Err(e) = validate_selector(&selector, cli.header_line_num) {
        e.log_warn();
        return Err(CoreError::from(e).into());
    }
    let header_line_num = usize::try_from(cli.header_line_num)?;

    let config = AppConfig::load(cli.config.as_deref()).map_err(CoreError::from)?;
    let credentials = Credentials::from_config(&config.api).map_err(CoreError::from)?;
    let bearer_token = credentials.bearer_token().await?;
    let client = Arc::new(TwitterApiClient::new(&config.api, bearer_token)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, stopping at the next wait");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    let budget = RateBudget::new(&config.rate_limits, Arc::new(SystemClock));
    let pacer = Pacer::new(budget, Arc::new(TokioSleeper), shutdown_rx);
    let keywords = KeywordExpression::parse(&cli.keyword_of_csv_format);

    let outcome = stream_feed(
        client.clone(),
        pacer,
        &selector,
        header_line_num,
        keywords,
        &config,
    )
    .await;
    client.log_metrics_summary().await;
    outcome
}

async fn stream_feed(
    api: Arc<dyn TwitterApi>,
    mut pacer: Pacer,
    selector: &TargetSelector,
    header_line_num: usize,
    keywords: KeywordExpression,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let targets = TargetResolver::new(api.clone(), config.api.owner_user_id.clone())
        .with_header_line(header_line_num)
        .resolve(selector, &mut pacer)
        .await?;
    if targets.is_empty() {
        warn!("{} resolved to no accounts, nothing to poll", selector);
        return Ok(());
    }

    let scheduler = PollScheduler::new(api, pacer, targets, keywords, &config.polling);
    let estimate = scheduler.estimated_cycle_duration();
    info!(
        "Polling {} accounts; one full cycle takes up to {} minutes within the rate limit",
        scheduler.active_accounts(),
        estimate.as_secs() / 60
    );

    let emitter = ConsoleEmitter::stdout();
    let feed = scheduler.into_feed();
    futures::pin_mut!(feed);
    while let Some(matched) = feed.next().await {
        emitter.emit(&matched).await?;
    }

    info!("Feed finished");
    Ok(())
}
