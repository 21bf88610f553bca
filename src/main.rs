// Entrypoint for the card publisher.
// - Keeps `main` small: resolve settings, build the pipeline, hand over
//   to the publisher and print a summary.
// - Returns `anyhow::Result` so startup errors surface with context.

use anyhow::{Context, Result};
use card_publisher::api::ApiClient;
use card_publisher::config::{Overrides, Settings};
use card_publisher::credentials::Credentials;
use card_publisher::images::HttpImageFetcher;
use card_publisher::profile::{CollectionRef, Profile, ProfileKind};
use card_publisher::publisher::Publisher;
use card_publisher::results::ResultWriter;
use card_publisher::{records, ui};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Publish scraped card CSV rows to a collection tracking API
#[derive(Parser, Debug)]
#[command(name = "card-publisher")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "CARD_PUBLISHER_CONFIG")]
    config: Option<PathBuf>,

    /// What each row becomes
    #[arg(short, long, value_enum, env = "CARD_PUBLISHER_PROFILE")]
    profile: Option<ProfileKind>,

    /// Collection or wishlist URL (or its UUID)
    #[arg(short, long, env = "CARD_PUBLISHER_TARGET")]
    target: Option<String>,

    /// Input CSV
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output CSV of published rows
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for downloaded images
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Credentials file with `username:` and `password:` lines
    #[arg(long, env = "CARD_PUBLISHER_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// API base URL
    #[arg(long, env = "CARD_PUBLISHER_BASE_URL")]
    base_url: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            profile: self.profile,
            target: self.target.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            image_dir: self.image_dir.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "card_publisher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let interactive = ui::is_interactive();

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_overrides(args.overrides());
    settings.validate()?;
    ui::fill_missing_inputs(&mut settings, interactive)?;

    let target_input = settings.target.clone().unwrap_or_default();
    let target = CollectionRef::parse(&target_input, settings.profile.scope())?;
    let profile = Profile::new(settings.profile, &target, settings.profile_options())?;
    info!("Publishing {:?} rows into {}", profile.kind, target);

    // Credentials are checked before any network traffic.
    let credentials = Credentials::load(&settings.credentials)?;

    let input = settings.input.clone().unwrap_or_default();
    let cards = records::load(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    if cards.is_empty() {
        println!("{} has no rows to publish.", input.display());
        return Ok(());
    }

    if interactive && !args.yes && !ui::confirm_publish(cards.len(), &target, &settings.base_url)? {
        println!("Aborted.");
        return Ok(());
    }

    let client = ApiClient::new(&settings.base_url, settings.timeout())?;
    let images = HttpImageFetcher::new(client.http().clone(), &settings.image_dir);
    let mut writer = ResultWriter::create(&settings.output)
        .with_context(|| format!("Failed to create {}", settings.output.display()))?;

    let mut publisher = Publisher::new(client, images, profile, credentials)
        .with_refresh_policy(settings.refresh_policy())
        .with_throttle(settings.throttle());
    let progress = (!args.no_progress && interactive).then(|| ui::progress_bar(cards.len()));
    if let Some(pb) = &progress {
        publisher = publisher.with_progress(pb.clone());
    }

    let outcome = publisher.run(cards, |result| writer.record(result));
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let report = outcome?;

    ui::print_summary(&report, &settings.output);
    Ok(())
}
