/*
 *  weather.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Weather polling: stale-while-revalidate with cancellation of
 *  superseded requests
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
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::WallClock;
use crate::error::{FetchError, NO_WEATHER_CITY};
use crate::sources::WeatherSource;
use crate::visibility::{Visibility, VisibilityWatch};

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// One weather reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city_name: String,
    /// provider icon code, e.g. "04d"
    pub condition_code: String,
    pub description: String,
    pub temperature_c: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionPayload {
    icon: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainPayload {
    temp: Option<f64>,
}

/// OpenWeatherMap-style current weather document.
#[derive(Debug, Deserialize)]
pub struct WeatherPayload {
    name: Option<String>,
    #[serde(default)]
    weather: Vec<ConditionPayload>,
    main: Option<MainPayload>,
}

impl TryFrom<WeatherPayload> for WeatherSnapshot {
    type Error = FetchError;

    fn try_from(p: WeatherPayload) -> Result<Self, Self::Error> {
        let temperature_c = p
            .main
            .and_then(|m| m.temp)
            .ok_or_else(|| FetchError::Payload("weather payload without temperature".into()))?;
        let condition = p.weather.into_iter().next();
        Ok(Self {
            city_name: p.name.unwrap_or_default(),
            condition_code: condition.as_ref().and_then(|c| c.icon.clone()).unwrap_or_default(),
            description: condition.and_then(|c| c.description).unwrap_or_default(),
            temperature_c,
        })
    }
}

/// What the weather card reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherState {
    pub snapshot: Option<WeatherSnapshot>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Local>>,
}

impl WeatherState {
    /// Never fetched counts as stale.
    pub fn is_stale(&self, now: DateTime<Local>, ttl: Duration) -> bool {
        match self.last_updated {
            None => true,
            Some(at) => (now - at).to_std().map(|age| age >= ttl).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSettings {
    pub refresh: Duration,
    pub ttl: Duration,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self { refresh: DEFAULT_REFRESH, ttl: DEFAULT_TTL }
    }
}

#[derive(Debug)]
enum Command {
    Refresh,
    Stop,
}

type Settled = (u64, Result<WeatherSnapshot, FetchError>);

/// Single writer of [`WeatherState`].
struct Poller<S> {
    source: Arc<S>,
    clock: Arc<dyn WallClock>,
    settings: WeatherSettings,
    state: WeatherState,
    tx: watch::Sender<WeatherState>,
    done_tx: mpsc::UnboundedSender<Settled>,
    key: Option<String>,
    generation: u64,
    inflight: Option<CancellationToken>,
}

impl<S: WeatherSource> Poller<S> {
    fn publish(&self) {
        self.tx.send_replace(self.state.clone());
    }

    fn cancel_inflight(&mut self) {
        if let Some(token) = self.inflight.take() {
            debug!("Cancelling in-flight weather request");
            token.cancel();
        }
    }

    /// Start a request for the current key, superseding any running one.
    fn begin_fetch(&mut self) {
        self.cancel_inflight();

        let Some(city) = self.key.clone().filter(|k| !k.trim().is_empty()) else {
            warn!("Weather: {}", NO_WEATHER_CITY);
            // a result already queued for the old key must not land
            self.generation += 1;
            self.state = WeatherState {
                snapshot: None,
                loading: false,
                error: Some(NO_WEATHER_CITY.to_string()),
                last_updated: None,
            };
            self.publish();
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.inflight = Some(token.clone());
        self.state.loading = true;
        self.publish();

        info!("Fetching weather data for {}...", city);
        let source = Arc::clone(&self.source);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(FetchError::Cancelled),
                r = source.fetch_weather(&city, token.clone()) => r,
            };
            let _ = done_tx.send((generation, result));
        });
    }

    fn settle(&mut self, generation: u64, result: Result<WeatherSnapshot, FetchError>) {
        if generation != self.generation {
            debug!("Dropping result of superseded weather request #{}", generation);
            return;
        }
        match result {
            Err(e) if e.is_cancelled() => {
                // an abort is not a failure, leave everything as it was
                return;
            }
            Ok(snapshot) => {
                info!("Weather data fetched successfully: {} {:.1}°C", snapshot.city_name, snapshot.temperature_c);
                self.state.snapshot = Some(snapshot);
                self.state.last_updated = Some(self.clock.now());
                self.state.error = None;
            }
            Err(e) => {
                error!("Weather polling failed: {}", e);
                self.state.error = Some(e.to_string());
            }
        }
        self.inflight = None;
        self.state.loading = false;
        self.publish();
    }

    fn set_key(&mut self, key: Option<String>) {
        if key != self.key {
            info!("Weather city changed: {:?} -> {:?}", self.key, key);
            // error and age belong to the old target, the reading stays up
            self.state.error = None;
            self.state.last_updated = None;
        }
        self.key = key;
        self.begin_fetch();
    }

    fn on_visible(&mut self) {
        if self.key.is_none() {
            return;
        }
        if self.state.is_stale(self.clock.now(), self.settings.ttl) {
            debug!("Weather stale on visibility regain, revalidating");
            self.begin_fetch();
        }
    }
}

impl<S> Drop for Poller<S> {
    fn drop(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
    }
}

/// Handle to the weather polling task.
///
/// The task re-fetches when the city changes, when the display becomes
/// visible with a stale reading, and on a fixed period while visible. A
/// stale snapshot stays published until a fresh one replaces it.
pub struct WeatherPolicy {
    rx: watch::Receiver<WeatherState>,
    cmd_sender: Option<mpsc::Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl WeatherPolicy {
    pub fn start<S: WeatherSource>(
        source: Arc<S>,
        clock: Arc<dyn WallClock>,
        settings: WeatherSettings,
        mut city: watch::Receiver<Option<String>>,
        visibility: watch::Receiver<Visibility>,
    ) -> Self {
        let (tx, rx) = watch::channel(WeatherState::default());
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Settled>();
        let refresh = settings.refresh.max(Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut vis = VisibilityWatch::new(visibility);
            let initial_key = city.borrow_and_update().clone();
            let mut poller = Poller {
                source,
                clock,
                settings,
                state: WeatherState::default(),
                tx,
                done_tx,
                key: None,
                generation: 0,
                inflight: None,
            };
            poller.set_key(initial_key);

            let mut ticker = interval_at(Instant::now() + refresh, refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut city_open = true;
            let mut vis_open = true;

            loop {
                tokio::select! {
                    changed = city.changed(), if city_open => {
                        match changed {
                            Ok(()) => {
                                let key = city.borrow_and_update().clone();
                                poller.set_key(key);
                            }
                            Err(_) => city_open = false,
                        }
                    }
                    regained = vis.regained(), if vis_open => {
                        if regained {
                            poller.on_visible();
                        } else {
                            vis_open = false;
                        }
                    }
                    _ = ticker.tick() => {
                        if vis.is_visible() {
                            poller.begin_fetch();
                        } else {
                            debug!("Display hidden, skipping periodic weather refresh");
                        }
                    }
                    Some((generation, result)) = done_rx.recv() => {
                        poller.settle(generation, result);
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(Command::Refresh) => poller.begin_fetch(),
                            Some(Command::Stop) | None => {
                                info!("Weather polling task received stop signal. Exiting.");
                                break;
                            }
                        }
                    }
                }
            }
            poller.cancel_inflight();
        });

        Self { rx, cmd_sender: Some(cmd_tx), handle: Some(handle) }
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.rx.clone()
    }

    pub fn state(&self) -> WeatherState {
        self.rx.borrow().clone()
    }

    /// Fetch now, regardless of staleness.
    pub async fn refresh(&self) {
        if let Some(sender) = &self.cmd_sender {
            if let Err(e) = sender.send(Command::Refresh).await {
                error!("Failed to request weather refresh: {}", e);
            }
        }
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.cmd_sender.take() {
            let _ = sender.send(Command::Stop).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Weather polling task failed to join: {}", e));
        }
        info!("Weather polling stopped.");
    }
}

impl Drop for WeatherPolicy {
    fn drop(&mut self) {
        if let Some(sender) = self.cmd_sender.take() {
            let _ = sender.try_send(Command::Stop);
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AnchoredClock;
    use crate::visibility::VisibilitySignal;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum Step {
        Ok,
        Fail(&'static str),
        Hang,
    }

    struct DropCounter<'a>(&'a AtomicUsize);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedWeather {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        cancelled: AtomicUsize,
        cities: Mutex<Vec<String>>,
    }

    impl ScriptedWeather {
        fn with(steps: &[Step]) -> Arc<Self> {
            let s = Self::default();
            s.script.lock().unwrap().extend(steps.iter().cloned());
            Arc::new(s)
        }
    }

    impl WeatherSource for ScriptedWeather {
        async fn fetch_weather(&self, city: &str, cancel: CancellationToken) -> Result<WeatherSnapshot, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.cities.lock().unwrap().push(city.to_string());
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
            match step {
                Step::Ok => Ok(WeatherSnapshot {
                    city_name: city.to_string(),
                    condition_code: "01d".into(),
                    description: "clear sky".into(),
                    temperature_c: n as f64,
                }),
                Step::Fail(msg) => Err(FetchError::Payload(msg.into())),
                Step::Hang => {
                    // counts however the request gets torn down
                    let _guard = DropCounter(&self.cancelled);
                    cancel.cancelled().await;
                    Err(FetchError::Cancelled)
                }
            }
        }
    }

    fn clock() -> Arc<AnchoredClock> {
        Arc::new(AnchoredClock::new(Local.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap()))
    }

    const MIN: Duration = Duration::from_secs(60);

    #[test]
    fn test_payload_to_snapshot() {
        let json = r#"{"name":"Hannover","weather":[{"icon":"04d","description":"broken clouds"}],"main":{"temp":12.3}}"#;
        let p: WeatherPayload = serde_json::from_str(json).unwrap();
        let snap = WeatherSnapshot::try_from(p).unwrap();
        assert_eq!(snap.city_name, "Hannover");
        assert_eq!(snap.condition_code, "04d");
        assert_eq!(snap.temperature_c, 12.3);

        let p: WeatherPayload = serde_json::from_str(r#"{"name":"X","weather":[]}"#).unwrap();
        assert!(WeatherSnapshot::try_from(p).is_err());
    }

    #[test]
    fn test_staleness() {
        let now = Local.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap();
        let mut state = WeatherState::default();
        assert!(state.is_stale(now, DEFAULT_TTL));
        state.last_updated = Some(now);
        assert!(!state.is_stale(now + chrono::Duration::minutes(9), DEFAULT_TTL));
        assert!(state.is_stale(now + chrono::Duration::minutes(10), DEFAULT_TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_revalidates_only_when_stale() {
        let source = ScriptedWeather::with(&[]);
        let signal = VisibilitySignal::default();
        let (_city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let settings = WeatherSettings { refresh: 15 * MIN, ttl: 10 * MIN };
        let mut policy = WeatherPolicy::start(source.clone(), clock(), settings, city_rx, signal.subscribe());
        let mut rx = policy.subscribe();

        rx.wait_for(|s| s.snapshot.is_some() && !s.loading).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(9 * MIN).await;
        signal.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_millis(1)).await;
        signal.set(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        // still showing the t=0 reading
        assert_eq!(rx.borrow().snapshot.as_ref().unwrap().temperature_c, 1.0);

        tokio::time::advance(2 * MIN).await;
        signal.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_millis(1)).await;
        signal.set(Visibility::Visible);
        rx.wait_for(|s| s.snapshot.as_ref().map(|w| w.temperature_c) == Some(2.0)).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        policy.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_skipped_while_hidden() {
        let source = ScriptedWeather::with(&[]);
        let signal = VisibilitySignal::default();
        let (_city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let settings = WeatherSettings { refresh: 15 * MIN, ttl: 10 * MIN };
        let mut policy = WeatherPolicy::start(source.clone(), clock(), settings, city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.snapshot.is_some()).await.unwrap();

        signal.set(Visibility::Hidden);
        tokio::time::sleep(16 * MIN).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // next period while visible fetches again, the regain itself already did
        signal.set(Visibility::Visible);
        rx.wait_for(|s| s.snapshot.as_ref().map(|w| w.temperature_c) == Some(2.0)).await.unwrap();
        tokio::time::sleep(15 * MIN).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        policy.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_stale_snapshot() {
        let source = ScriptedWeather::with(&[Step::Ok, Step::Fail("boom")]);
        let signal = VisibilitySignal::default();
        let (_city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.snapshot.is_some() && !s.loading).await.unwrap();

        policy.refresh().await;
        let state = rx.wait_for(|s| s.error.is_some()).await.unwrap().clone();
        assert_eq!(state.error.as_deref(), Some("invalid payload: boom"));
        assert!(!state.loading);
        assert_eq!(state.snapshot.unwrap().temperature_c, 1.0);
        policy.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_leaves_error_alone() {
        let source = ScriptedWeather::with(&[Step::Fail("boom"), Step::Hang, Step::Hang]);
        let signal = VisibilitySignal::default();
        let (_city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.error.is_some() && !s.loading).await.unwrap();

        policy.refresh().await;
        rx.wait_for(|s| s.loading).await.unwrap();
        // supersede the hanging request with another hanging one
        policy.refresh().await;
        while source.cancelled.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = policy.state();
        assert_eq!(state.error.as_deref(), Some("invalid payload: boom"));
        assert!(state.loading);
        policy.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.cancelled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_city_change_cancels_and_refetches() {
        let source = ScriptedWeather::with(&[Step::Hang, Step::Ok]);
        let signal = VisibilitySignal::default();
        let (city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.loading).await.unwrap();

        city_tx.send_replace(Some("Braunschweig".to_string()));
        let state = rx.wait_for(|s| s.snapshot.is_some()).await.unwrap().clone();
        assert_eq!(state.snapshot.unwrap().city_name, "Braunschweig");
        assert_eq!(source.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(*source.cities.lock().unwrap(), vec!["Hannover", "Braunschweig"]);
        policy.stop().await;
    }

    /// Holds every request until the gate opens.
    #[derive(Default)]
    struct GatedWeather {
        gate: tokio::sync::Notify,
    }

    impl WeatherSource for GatedWeather {
        async fn fetch_weather(&self, city: &str, _cancel: CancellationToken) -> Result<WeatherSnapshot, FetchError> {
            self.gate.notified().await;
            Ok(WeatherSnapshot {
                city_name: city.to_string(),
                condition_code: "01d".into(),
                description: "clear sky".into(),
                temperature_c: 20.0,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_queued_before_key_removal_is_dropped() {
        let source = Arc::new(GatedWeather::default());
        let signal = VisibilitySignal::default();
        let (city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.loading).await.unwrap();

        // the reading and the key removal arrive in the same turn
        source.gate.notify_one();
        city_tx.send_replace(None);
        rx.wait_for(|s| s.error.is_some()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = policy.state();
        assert_eq!(state.error.as_deref(), Some(NO_WEATHER_CITY));
        assert!(state.snapshot.is_none());
        assert!(state.last_updated.is_none());
        policy.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_city_change_resets_age_but_keeps_reading() {
        let source = ScriptedWeather::with(&[Step::Ok, Step::Fail("no such city")]);
        let signal = VisibilitySignal::default();
        let (city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.last_updated.is_some()).await.unwrap();

        city_tx.send_replace(Some("Braunschweig".to_string()));
        let state = rx.wait_for(|s| s.error.is_some() && !s.loading).await.unwrap().clone();
        assert!(state.last_updated.is_none());
        assert_eq!(state.snapshot.unwrap().city_name, "Hannover");

        // never fetched for this city, so a regain revalidates at once
        signal.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_millis(1)).await;
        signal.set(Visibility::Visible);
        let state = rx.wait_for(|s| s.last_updated.is_some()).await.unwrap().clone();
        assert_eq!(state.snapshot.unwrap().city_name, "Braunschweig");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        policy.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_policy_cancels_inflight_request() {
        let source = ScriptedWeather::with(&[Step::Hang]);
        let signal = VisibilitySignal::default();
        let (_city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.loading).await.unwrap();
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        drop(policy);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_city_clears_cache() {
        let source = ScriptedWeather::with(&[]);
        let signal = VisibilitySignal::default();
        let (city_tx, city_rx) = watch::channel(Some("Hannover".to_string()));
        let mut policy = WeatherPolicy::start(source.clone(), clock(), WeatherSettings::default(), city_rx, signal.subscribe());
        let mut rx = policy.subscribe();
        rx.wait_for(|s| s.snapshot.is_some()).await.unwrap();

        city_tx.send_replace(None);
        let state = rx.wait_for(|s| s.error.is_some()).await.unwrap().clone();
        assert_eq!(state.error.as_deref(), Some(NO_WEATHER_CITY));
        assert!(state.snapshot.is_none());
        assert!(state.last_updated.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        policy.stop().await;
    }
}
