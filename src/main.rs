/*
 *  main.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};

use vakitmatik::clock::{SystemClock, WallClock};
use vakitmatik::config::{self, Cli, DEFAULT_CITY};
use vakitmatik::navigation::{fallback_text, is_valid_city, resolve_page, Route};
use vakitmatik::render::FrameSink;
use vakitmatik::session::{Session, SessionSources};
use vakitmatik::sources::http::HttpSources;
use vakitmatik::visibility::{Visibility, VisibilitySignal};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Screen blanker hooks report display state: SIGUSR1 hidden, SIGUSR2 visible.
async fn visibility_handler(visibility: VisibilitySignal) -> anyhow::Result<()> {
    let mut hidden = signal(SignalKind::user_defined1())?;
    let mut visible = signal(SignalKind::user_defined2())?;
    loop {
        tokio::select! {
            Some(()) = hidden.recv() => {
                info!("SIGUSR1 received, display hidden");
                visibility.set(Visibility::Hidden);
            }
            Some(()) = visible.recv() => {
                info!("SIGUSR2 received, display visible");
                visibility.set(Visibility::Visible);
            }
            else => return Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli).context("loading configuration")?;

    if cli.dump_config {
        println!("{}", config::dump(&cfg)?);
        return Ok(());
    }

    let level = if cli.debug { "debug" } else { cfg.log_level.as_deref().unwrap_or("info") };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - prayer times kiosk", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let mut sink = FrameSink::new(cfg.render_mode());
    let city_key = match resolve_page(&cfg.start_path(), DEFAULT_CITY) {
        Route::City(key) | Route::Redirect(key) => key,
        Route::Fallback => {
            warn!("No city page for {:?}", cfg.start_path());
            sink.present(&fallback_text(&cfg))?;
            return signal_handler().await;
        }
    };
    if !is_valid_city(&cfg, &city_key) {
        warn!("Unknown city {:?}, valid are {:?}", city_key, cfg.cities().keys().collect::<Vec<_>>());
    }

    let wall: Arc<dyn WallClock> = Arc::new(SystemClock);
    let http = Arc::new(
        HttpSources::new(&cfg.sources(), &cfg.weather_lang(), Arc::clone(&wall))
            .context("building HTTP client")?,
    );
    let visibility = VisibilitySignal::default();
    let sources = SessionSources { prayer: Arc::clone(&http), content: Arc::clone(&http), weather: http };
    let session = Session::start(&cfg, &city_key, sources, wall, &visibility);

    let mut clock_rx = session.clock();
    let mut footer_rx = session.footer();

    tokio::select! {
        res = signal_handler() => res?,
        res = visibility_handler(visibility.clone()) => res?,
        _ = async {
            loop {
                tokio::select! {
                    changed = clock_rx.changed() => if changed.is_err() { break },
                    changed = footer_rx.changed() => if changed.is_err() { break },
                }
                if !visibility.current().is_visible() {
                    continue;
                }
                if let Err(e) = sink.present(&session.frame()) {
                    warn!("Failed to present frame: {}", e);
                }
            }
        } => {
            warn!("Session channels closed, exiting");
        }
    }

    session.shutdown().await;
    info!("Bye.");
    Ok(())
}
