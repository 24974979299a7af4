//! Lumenbeat - audio-reactive DMX lighting
//!
//! Usage: `lumenbeat [SHOW_DIR]` or `lumenbeat --list-devices`.
//! The show directory defaults to `$LUMENBEAT_CONFIG_DIR`, then `./show`.
//! Press Enter (or close stdin) to stop.

#![warn(missing_docs)]

mod app;
mod logging_setup;

use anyhow::{Context, Result};
use app::App;
use lumenbeat_core::{ShowConfig, ShowSettings};
use std::io::{self, BufRead};
use tracing::info;

fn list_devices() -> Result<()> {
    #[cfg(feature = "audio")]
    {
        let devices = lumenbeat_core::audio::list_input_devices()
            .context("Failed to enumerate audio input devices")?;
        if devices.is_empty() {
            println!("No audio input devices found");
        }
        for name in devices {
            println!("{}", name);
        }
    }
    #[cfg(not(feature = "audio"))]
    println!("Built without audio support");
    Ok(())
}

/// Block until a line or EOF arrives on stdin
fn wait_for_enter() {
    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        tracing::warn!("Failed to read stdin ({}), stopping", e);
    }
}

fn main() -> Result<()> {
    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--list-devices") {
        return list_devices();
    }

    let dir = ShowConfig::resolve_dir(arg.as_deref());

    // logging first so that skipped show entries are reported
    let settings = ShowSettings::load(&dir)
        .with_context(|| format!("Failed to read settings from {:?}", dir))?;
    let mut log_config = settings.log;
    log_config.start_session();
    let _log_guard = logging_setup::init(&log_config)?;

    info!("==========================================");
    info!("===     Lumenbeat Session Started      ===");
    info!("==========================================");

    let show = ShowConfig::load(&dir).with_context(|| format!("Failed to load show {:?}", dir))?;
    let app = App::start(&show)?;
    info!(
        "Starting with theme {}, press Enter to stop",
        app.board()
            .lock()
            .active_theme()
            .unwrap_or("-")
    );

    wait_for_enter();
    app.shutdown();
    Ok(())
}
