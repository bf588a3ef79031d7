//! 🚀 azb-cli — the front door, the bouncer, the maitre d' of azb.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use azb::RunSummary;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Find the config file (first arg, or `azb.toml` if it's lying around)
/// 3. Load config (the moment of truth)
/// 4. Run the thing, print the receipt
/// 5. Handle errors (cry, then exit 1)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path_arg = std::env::args().nth(1);
    let config_file = Path::new(path_arg.as_deref().unwrap_or("azb.toml"));

    // 🔒 an explicit path must exist; the default one is optional (env vars can carry the day)
    let config_file_exists = config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't even check whether '{}' exists. Permissions, maybe. Or the disk is \
             having a moment.",
            config_file.display()
        )
    })?;
    if path_arg.is_some() && !config_file_exists {
        anyhow::bail!(
            "💀 Configuration file '{}' does not exist. If it's a relative path, it's relative \
             to where you ran this from, not where the binary lives.",
            config_file.display()
        );
    }
    let config_file = config_file_exists.then_some(config_file);

    // 🔧 Load the config — this is where we find out if someone put a tab where a space should be
    let app_config = azb::app_config::load_config(config_file)
        .context("💀 In azb-cli, main, we couldn't load the config. Take a look at the file and the AZB_* env vars.")?;

    let started = Instant::now();
    match azb::run(app_config).await {
        Ok(summary) => {
            println!("{}", summary_table(&summary, started.elapsed().as_secs_f64()));
            // -- ⚠️ dropped batches are a partial failure; scripts deserve to know
            if summary.stats.batches_failed > 0 {
                error!(
                    "💀 {} batch(es) were dropped after exhausting retries",
                    summary.stats.batches_failed
                );
                std::process::exit(2);
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("onnection refused")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like the blob endpoint isn't reachable. Check the endpoint URL \
                     in [sink_config.Azblob], and whether the storage emulator is actually up. ☕"
                );
            }
            // 🗑️ Exit with prejudice.
            std::process::exit(1);
        }
    }
}

/// 🍽️ The receipt: two columns, right-aligned, no borders.
fn summary_table(summary: &RunSummary, elapsed_secs: f64) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let rows = [
        ("records read", summary.records_read.to_string()),
        ("records batched", summary.stats.records_received.to_string()),
        ("batches uploaded", summary.stats.batches_flushed.to_string()),
        ("batches dropped", summary.stats.batches_failed.to_string()),
        ("bytes uploaded", summary.stats.bytes_uploaded.to_string()),
        ("elapsed", format!("{elapsed_secs:.2}s")),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label).set_alignment(CellAlignment::Right),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
