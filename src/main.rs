//! attendscan CLI.
//!
//! ```bash
//! # Decode a photographed code and submit it
//! attendscan image badge.png
//!
//! # Manual fallback when no camera or photo is available
//! attendscan submit "STU-12345|2024-06-01T08:00:00Z"
//!
//! # Recent scan history
//! attendscan history 10
//!
//! # With a custom service endpoint and data directory
//! ATTENDSCAN_API_URL=http://sis.school.example ATTENDSCAN_DATA_DIR=/var/lib/attendscan attendscan history
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;

use attendscan::api::HttpAttendanceClient;
use attendscan::capture::{CaptureController, UnavailableDevice};
use attendscan::config::SettingsStore;
use attendscan::db::Database;
use attendscan::decode::QrFrameDecoder;
use attendscan::notify::LogNotifier;

/// Runtime configuration from environment
struct Env {
    data_dir: PathBuf,
    api_url: Option<String>,
}

impl Env {
    fn from_env() -> Self {
        let data_dir = std::env::var("ATTENDSCAN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./attendscan-data"));

        let api_url = std::env::var("ATTENDSCAN_API_URL").ok();

        Self { data_dir, api_url }
    }
}

fn usage() -> ! {
    eprintln!("usage: attendscan <image PATH | submit CODE | history [N]>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let env = Env::from_env();
    std::fs::create_dir_all(&env.data_dir)
        .with_context(|| format!("failed to create data dir {}", env.data_dir.display()))?;

    let store = SettingsStore::new(env.data_dir.join("settings.json"))?;
    let mut settings = store.settings();
    if let Some(url) = env.api_url {
        settings.api.base_url = url;
    }

    let db = Database::new(env.data_dir.join("attendscan.sqlite3"))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut args = args.iter();
    let command = args.next().map(String::as_str).unwrap_or("");

    match command {
        "history" => {
            let limit = args
                .next()
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(settings.history.visible_limit);

            let entries = db.recent_scans(limit).await?;
            let totals = db.outcome_totals().await?;

            for entry in &entries {
                println!(
                    "{}  {:<7}  {}",
                    entry.timestamp.to_rfc3339(),
                    entry.outcome.as_str(),
                    entry.detail
                );
            }
            println!(
                "{} shown | totals: {} success, {} failed, {} error",
                entries.len(),
                totals.success,
                totals.failed,
                totals.error
            );
        }
        "image" | "submit" => {
            let api = HttpAttendanceClient::new(&settings.api.base_url, settings.api.timeout())?;
            let controller = CaptureController::new(
                Arc::new(UnavailableDevice),
                Arc::new(QrFrameDecoder),
                Arc::new(api),
                Arc::new(LogNotifier),
                db,
                settings.capture.loop_config(),
            )
            .with_facing(settings.capture.preferred_facing);

            if command == "image" {
                let Some(path) = args.next() else { usage() };
                let image = image::open(path)
                    .with_context(|| format!("failed to load image {path}"))?;
                controller.submit_image(&image).await?;
            } else {
                let Some(code) = args.next() else { usage() };
                controller.submit_manual_code(code).await?;
            }

            info!("submission handshake complete");
        }
        "" => usage(),
        other => bail!("unknown command '{other}'"),
    }

    Ok(())
}
