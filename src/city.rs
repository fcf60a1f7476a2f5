/*
 *  city.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Per city data orchestration: prayer times and daily content loaded
 *  side by side, each allowed to fail on its own
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

use std::collections::BTreeMap;
use std::future::pending;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::config::CityConfig;
use crate::content::DailyContentSet;
use crate::error::{FetchError, INVALID_CITY, LOAD_FAILED};
use crate::prayer::PrayerTimeSet;
use crate::sources::{DailyContentSource, PrayerTimeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    PartialReady,
    Failed,
}

/// Everything the page knows about the selected city. Replaced, never
/// merged, when the city changes.
#[derive(Debug, Clone, PartialEq)]
pub struct CityContext {
    pub city_key: String,
    pub config: Option<CityConfig>,
    pub is_valid_city: bool,
    pub phase: LoadPhase,
    pub loading: bool,
    pub error: Option<String>,
    pub prayer_times: Option<PrayerTimeSet>,
    pub daily_content: Option<DailyContentSet>,
    pub hijri_date_long: Option<String>,
    pub gregorian_date_short: Option<String>,
}

impl CityContext {
    pub fn new(city_key: &str, config: Option<CityConfig>) -> Self {
        Self {
            city_key: city_key.to_string(),
            is_valid_city: config.is_some(),
            config,
            phase: LoadPhase::Idle,
            loading: false,
            error: None,
            prayer_times: None,
            daily_content: None,
            hijri_date_long: None,
            gregorian_date_short: None,
        }
    }

    /// Weather lookup name, if the city has one.
    pub fn weather_key(&self) -> Option<String> {
        self.config.as_ref().and_then(|c| c.weather_city_name.clone())
    }

    pub fn content_len(&self) -> usize {
        self.daily_content.as_ref().map_or(0, DailyContentSet::len)
    }
}

#[derive(Debug)]
enum Command {
    SetCity(String),
    Refresh,
    Stop,
}

struct Fetched {
    prayer: Result<PrayerTimeSet, FetchError>,
    content: Result<DailyContentSet, FetchError>,
}

/// Cloneable trigger for a reload, usable from sync callbacks such as the
/// midnight scheduler.
#[derive(Clone)]
pub struct ReloadTrigger {
    sender: mpsc::Sender<Command>,
}

impl ReloadTrigger {
    pub fn reload(&self) {
        if let Err(e) = self.sender.try_send(Command::Refresh) {
            warn!("City reload request dropped: {}", e);
        }
    }
}

struct Loader<P, D> {
    prayer: Arc<P>,
    content: Arc<D>,
    cities: BTreeMap<String, CityConfig>,
    state: CityContext,
    tx: watch::Sender<CityContext>,
    weather_tx: watch::Sender<Option<String>>,
    generation: u64,
    cycle: Option<(u64, JoinHandle<Fetched>)>,
}

impl<P: PrayerTimeSource, D: DailyContentSource> Loader<P, D> {
    fn publish(&self) {
        self.tx.send_replace(self.state.clone());
        let key = self.state.weather_key();
        self.weather_tx.send_if_modified(|current| {
            if *current != key {
                *current = key;
                true
            } else {
                false
            }
        });
    }

    fn abort_cycle(&mut self) {
        if let Some((generation, handle)) = self.cycle.take() {
            debug!("Aborting load cycle #{}", generation);
            handle.abort();
        }
    }

    fn select_city(&mut self, key: String) {
        let config = self.cities.get(&key).cloned();
        info!("City selected: {} ({})", key, if config.is_some() { "valid" } else { "unknown" });
        self.abort_cycle();
        self.state = CityContext::new(&key, config);
        self.begin();
    }

    fn begin(&mut self) {
        self.abort_cycle();

        let Some(config) = self.state.config.clone() else {
            warn!("Not loading data for {:?}: {}", self.state.city_key, INVALID_CITY);
            self.state.phase = LoadPhase::Failed;
            self.state.loading = false;
            self.state.error = Some(INVALID_CITY.to_string());
            self.publish();
            return;
        };

        self.generation += 1;
        self.state.phase = LoadPhase::Loading;
        self.state.loading = true;
        self.state.error = None;
        self.publish();

        info!("Loading prayer times and daily content for {} (cycle #{})", self.state.city_key, self.generation);
        let prayer = Arc::clone(&self.prayer);
        let content = Arc::clone(&self.content);
        let handle = tokio::spawn(async move {
            let (prayer, content) = tokio::join!(
                prayer.fetch_prayer_times(&config.prayer_source, &config.fallback_source),
                content.fetch_daily_content(),
            );
            Fetched { prayer, content }
        });
        self.cycle = Some((self.generation, handle));
    }

    fn settle(&mut self, generation: u64, result: Result<Fetched, JoinError>) {
        if generation != self.generation {
            debug!("Ignoring outdated load cycle #{}", generation);
            return;
        }
        match result {
            Ok(Fetched { prayer, content }) => {
                let prayer = prayer
                    .inspect_err(|e| warn!("Prayer times unavailable for {}: {}", self.state.city_key, e))
                    .ok();
                let content = content.inspect_err(|e| warn!("Daily content unavailable: {}", e)).ok();

                self.state.phase = match (prayer.is_some(), content.is_some()) {
                    (true, true) => LoadPhase::Ready,
                    (false, false) => LoadPhase::Failed,
                    _ => LoadPhase::PartialReady,
                };
                self.state.hijri_date_long = prayer.as_ref().and_then(|p| p.hijri_date_long.clone());
                self.state.gregorian_date_short = prayer.as_ref().and_then(|p| p.gregorian_date_short.clone());
                self.state.prayer_times = prayer;
                self.state.daily_content = content;
                self.state.error = None;
                info!("Load cycle #{} for {} finished: {:?}", generation, self.state.city_key, self.state.phase);
            }
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                error!("Load cycle #{} failed: {}", generation, e);
                self.state.phase = LoadPhase::Failed;
                self.state.error = Some(LOAD_FAILED.to_string());
            }
        }
        self.state.loading = false;
        self.publish();
    }
}

async fn join_cycle(cycle: &mut Option<(u64, JoinHandle<Fetched>)>) -> (u64, Result<Fetched, JoinError>) {
    match cycle {
        Some((generation, handle)) => {
            let result = handle.await;
            (*generation, result)
        }
        None => pending().await,
    }
}

/// Owns the load cycles of the selected city and publishes its
/// [`CityContext`].
pub struct CityOrchestrator {
    rx: watch::Receiver<CityContext>,
    weather_rx: watch::Receiver<Option<String>>,
    cmd_sender: Option<mpsc::Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl CityOrchestrator {
    /// Select `city_key` and start loading it.
    pub fn start<P: PrayerTimeSource, D: DailyContentSource>(
        prayer: Arc<P>,
        content: Arc<D>,
        cities: BTreeMap<String, CityConfig>,
        city_key: &str,
    ) -> Self {
        let initial = CityContext::new(city_key, cities.get(city_key).cloned());
        let (tx, rx) = watch::channel(initial.clone());
        let (weather_tx, weather_rx) = watch::channel(initial.weather_key());
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let first_key = city_key.to_string();

        let handle = tokio::spawn(async move {
            let mut loader = Loader {
                prayer,
                content,
                cities,
                state: initial,
                tx,
                weather_tx,
                generation: 0,
                cycle: None,
            };
            loader.select_city(first_key);

            loop {
                tokio::select! {
                    (generation, result) = join_cycle(&mut loader.cycle) => {
                        loader.cycle = None;
                        loader.settle(generation, result);
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(Command::SetCity(key)) => loader.select_city(key),
                            Some(Command::Refresh) => loader.begin(),
                            Some(Command::Stop) | None => {
                                info!("City orchestrator received stop signal. Exiting.");
                                break;
                            }
                        }
                    }
                }
            }
            loader.abort_cycle();
        });

        Self { rx, weather_rx, cmd_sender: Some(cmd_tx), handle: Some(handle) }
    }

    pub fn subscribe(&self) -> watch::Receiver<CityContext> {
        self.rx.clone()
    }

    /// Weather lookup name of the selected city.
    pub fn weather_key(&self) -> watch::Receiver<Option<String>> {
        self.weather_rx.clone()
    }

    pub fn context(&self) -> CityContext {
        self.rx.borrow().clone()
    }

    pub fn reload_trigger(&self) -> Option<ReloadTrigger> {
        self.cmd_sender.as_ref().map(|sender| ReloadTrigger { sender: sender.clone() })
    }

    async fn send(&self, cmd: Command) {
        if let Some(sender) = &self.cmd_sender {
            if let Err(e) = sender.send(cmd).await {
                error!("City orchestrator is gone: {}", e);
            }
        }
    }

    pub async fn set_city(&self, key: &str) {
        self.send(Command::SetCity(key.to_string())).await;
    }

    pub async fn refresh(&self) {
        self.send(Command::Refresh).await;
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.cmd_sender.take() {
            let _ = sender.send(Command::Stop).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("City orchestrator task failed to join: {}", e));
        }
        info!("City orchestrator stopped.");
    }
}

impl Drop for CityOrchestrator {
    fn drop(&mut self) {
        if let Some(sender) = self.cmd_sender.take() {
            let _ = sender.try_send(Command::Stop);
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
