// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SessionMix - live per-application volume mixer.

use sessionmix::audio::{AudioPlatform, SimulatedPlatform};
use sessionmix::config::{AppConfig, Backend, ConfigManager};
use sessionmix::info::ProcfsMetadata;
use sessionmix::view::LogRenderer;
use sessionmix::Mixer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = ConfigManager::new().and_then(|manager| manager.load_config());
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AppConfig::default(),
    };

    // Initialize logging
    let directive = config
        .logging
        .filter
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(directive))
        .init();

    if let Err(e) = &loaded {
        warn!("Failed to load config, using defaults: {}", e);
    }
    info!(backend = ?config.general.backend, "Starting SessionMix");

    let shutdown = Arc::new(AtomicBool::new(false));
    let platform = open_platform(&config, &shutdown)?;

    let mut mixer = match Mixer::open(
        platform,
        Box::new(ProcfsMetadata::new()),
        LogRenderer::new(),
        &config,
    ) {
        Ok(mixer) => mixer,
        Err(e) => {
            error!("Failed to open mixer: {}", e);
            return Err(e.into());
        }
    };

    mixer.run(&shutdown);

    let renderer = mixer.close();
    info!(rows = ?renderer.rows(), "SessionMix stopped");
    Ok(())
}

/// Create the configured backend. The simulated backend runs its scenario
/// on a background thread and raises `shutdown` when the scenario ends.
fn open_platform(
    config: &AppConfig,
    shutdown: &Arc<AtomicBool>,
) -> Result<Arc<dyn AudioPlatform>, Box<dyn std::error::Error>> {
    match config.general.backend {
        Backend::Simulated => {
            let platform = Arc::new(SimulatedPlatform::new());
            let scenario = platform.spawn_scenario(
                Arc::clone(shutdown),
                Duration::from_secs(config.general.scenario_secs),
            );
            let flag = Arc::clone(shutdown);
            thread::spawn(move || {
                if scenario.join().is_err() {
                    warn!("Scenario thread panicked");
                }
                flag.store(true, Ordering::Relaxed);
            });
            Ok(platform)
        }
        #[cfg(feature = "pipewire")]
        Backend::Pipewire => {
            let platform = sessionmix::audio::PipeWirePlatform::connect()?;
            Ok(Arc::new(platform))
        }
        #[cfg(not(feature = "pipewire"))]
        Backend::Pipewire => Err("SessionMix was built without the `pipewire` feature".into()),
    }
}
