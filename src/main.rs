use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tender_webdriver::browser::chrome::ChromeDriver;
use tender_webdriver::control::Action;
use tender_webdriver::diagnostics::Diagnostics;
use tender_webdriver::handoff::{load_work_items, JsonlSink};
use tender_webdriver::history::ProcessedHistory;
use tender_webdriver::learning::{self, mine_locators, GuidedLearning, LearningRecorder};
use tender_webdriver::orchestrator::Orchestrator;
use tender_webdriver::resolver::LocatorResolver;
use tender_webdriver::session::AutomationSession;
use tender_webdriver::{PageDriver, RunConfig, TargetBook};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration (JSON)
    #[arg(short, long, default_value = "tender.json")]
    config: PathBuf,

    #[arg(long, env = "TENDER_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "TENDER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Portal URL used when a work item has no link
    #[arg(long, env = "TENDER_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a batch of work items
    Run {
        /// JSON array of {id, title, link}
        items: PathBuf,
    },
    /// Capture before/after snapshots around manual or resolved actions
    Learn {
        /// Step names; each waits for Enter on stdin between captures
        #[arg(required = true)]
        steps: Vec<String>,

        /// Let the resolver activate each named target instead of waiting for a manual action
        #[arg(long)]
        resolve: bool,
    },
    /// Print locators mined from stored learning artifacts
    Mine,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        RunConfig::from_file(&args.config)?
    } else {
        log::info!("No config at {}, using defaults", args.config.display());
        RunConfig::default()
    };
    config.override_credentials(args.username, args.password, args.url);

    match args.command {
        Command::Run { items } => run(config, items).await,
        Command::Learn { steps, resolve } => learn(config, steps, resolve).await,
        Command::Mine => mine(config).await,
    }
}

async fn target_book(config: &RunConfig) -> Result<TargetBook> {
    let mut book = config.target_book()?;
    if config.use_learned_locators {
        let artifacts = LearningRecorder::new(&config.learning_dir).load_all().await?;
        let learned = mine_locators(&artifacts);
        if !learned.is_empty() {
            log::info!("🧠 Merging learned locators for {} target(s)", learned.len());
            book.merge_learned(&learned);
        }
    }
    Ok(book)
}

async fn run(config: RunConfig, items_path: PathBuf) -> Result<()> {
    let items = load_work_items(&items_path).await?;
    let targets = target_book(&config).await?;
    let history = ProcessedHistory::load(&config.history_path).await?;
    let sink = Box::new(JsonlSink::new(&config.handoff_path));

    let driver = ChromeDriver::new(config.browser.clone(), Some(&config.artifact_dir))
        .await
        .context("Failed to start browser")?;
    let session = AutomationSession::new(
        driver,
        Diagnostics::new(&config.diagnostics_dir),
        config.skip_threshold,
    );

    let mut orchestrator = Orchestrator::new(config, targets, history, sink);
    let report = orchestrator.run(session, &items, interrupted()).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.cancelled {
        anyhow::bail!("run cancelled");
    }
    Ok(())
}

/// Resolves on Ctrl+C; never resolves if the signal cannot be watched
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("⚠️  Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Forwards each line read from stdin as a resume signal
fn stdin_resume() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    rx
}

async fn learn(config: RunConfig, steps: Vec<String>, resolve: bool) -> Result<()> {
    let targets = target_book(&config).await?;
    let driver = ChromeDriver::new(config.browser.clone(), Some(&config.artifact_dir))
        .await
        .context("Failed to start browser")?;
    let diagnostics = Diagnostics::new(&config.diagnostics_dir);
    let recorder = LearningRecorder::new(&config.learning_dir);

    let work = async {
        if !config.credentials.url.is_empty() {
            driver
                .navigate(&config.credentials.url, config.page_ready_timeout)
                .await?;
        }

        let learning = GuidedLearning::new(&driver, &diagnostics, &recorder);
        let resolver = LocatorResolver::new(&config.resolver);
        let mut resume = stdin_resume();

        for step in &steps {
            let artifact = if resolve {
                let target = targets
                    .get(step)
                    .with_context(|| format!("Unknown target '{}'", step))?;
                learning
                    .observe_resolution(&resolver, &config.executor, target, &Action::Activate)
                    .await?
            } else {
                println!("Perform '{}' in the browser, then press Enter", step);
                learning.capture_step(step, &mut resume).await?
            };

            let learned = artifact.learned_locators();
            log::info!("🧠 '{}': {} candidate locator(s)", step, learned.len());
            for locator in learned {
                println!("{}\t{}", step, locator);
            }
        }
        anyhow::Ok(())
    };

    learning::guarded(&driver, &diagnostics, work, interrupted()).await
}

async fn mine(config: RunConfig) -> Result<()> {
    let artifacts = LearningRecorder::new(&config.learning_dir).load_all().await?;
    log::info!("🧠 Mining {} learning artifact(s)", artifacts.len());
    println!("{}", serde_json::to_string_pretty(&mine_locators(&artifacts))?);
    Ok(())
}
