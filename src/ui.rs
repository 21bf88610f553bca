// UI layer: the few terminal interactions the publisher binary needs.
// Prompts use `dialoguer`, the row counter uses `indicatif`. Nothing here
// is needed when every input comes from flags or the config file.

use crate::config::Settings;
use crate::profile::CollectionRef;
use crate::publisher::RunReport;
use anyhow::{bail, Context, Result};
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// True when prompts can be answered.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Ask for the target and input CSV when neither flags nor the config
/// file provided them. Without a terminal a missing value is an error.
pub fn fill_missing_inputs(settings: &mut Settings, interactive: bool) -> Result<()> {
    if settings.target.is_none() {
        if !interactive {
            bail!("no target given; pass --target with a collection or wishlist URL");
        }
        let prompt = match settings.profile.scope() {
            crate::profile::Scope::Collection => "Collection URL",
            crate::profile::Scope::Wishlist => "Wishlist URL",
        };
        let target: String = Input::new()
            .with_prompt(prompt)
            .interact_text()
            .context("Failed to read target URL")?;
        settings.target = Some(target);
    }

    if settings.input.is_none() {
        if !interactive {
            bail!("no input CSV given; pass --input");
        }
        let path: String = Input::new()
            .with_prompt("CSV file")
            .interact_text()
            .context("Failed to read CSV path")?;
        settings.input = Some(PathBuf::from(path));
    }
    Ok(())
}

/// Last check before anything is sent to the server.
pub fn confirm_publish(count: usize, target: &CollectionRef, base_url: &str) -> Result<bool> {
    let answer = Confirm::new()
        .with_prompt(format!("Publish {count} card(s) to {base_url}{target}?"))
        .default(false)
        .interact()
        .context("Failed to read confirmation")?;
    Ok(answer)
}

/// Progress bar over `len` rows; the message shows the current card.
pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{bar:30} {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

pub fn print_summary(report: &RunReport, output: &Path) {
    println!(
        "Processed {} row(s): {} published, {} skipped, {} failed ({} authentication(s))",
        report.processed(),
        report.published.len(),
        report.skipped,
        report.failed,
        report.authentications
    );
    if report.published.is_empty() {
        println!("No cards were successfully posted.");
    } else {
        println!("Saved {} posted card(s) to {}", report.published.len(), output.display());
    }
}
