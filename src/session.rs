/*
 *  session.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  The active page: every timer and data owner for one navigation
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

use chrono::{DateTime, Local};
use log::info;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::city::{CityContext, CityOrchestrator};
use crate::clock::{DriftClock, WallClock};
use crate::config::{Config, FooterLayout};
use crate::footer::{FooterState, FooterTicker};
use crate::midnight::MidnightScheduler;
use crate::render::{render_frame, FrameInput};
use crate::sources::{DailyContentSource, PrayerTimeSource, WeatherSource};
use crate::visibility::VisibilitySignal;
use crate::weather::{WeatherPolicy, WeatherState};

/// External collaborators of a session.
pub struct SessionSources<P, D, W> {
    pub prayer: Arc<P>,
    pub content: Arc<D>,
    pub weather: Arc<W>,
}

/// One displayed city with all of its timers. Nothing here is global:
/// dropping or shutting down the session releases every task it started.
pub struct Session {
    clock: DriftClock,
    midnight: MidnightScheduler,
    city: CityOrchestrator,
    weather: WeatherPolicy,
    footer: FooterTicker,
    layout: FooterLayout,
}

impl Session {
    pub fn start<P, D, W>(
        cfg: &Config,
        city_key: &str,
        sources: SessionSources<P, D, W>,
        wall: Arc<dyn WallClock>,
        visibility: &VisibilitySignal,
    ) -> Self
    where
        P: PrayerTimeSource,
        D: DailyContentSource,
        W: WeatherSource,
    {
        info!("Starting session for {}", city_key);
        let layout = cfg.footer_layout();
        let clock = DriftClock::start(Arc::clone(&wall), cfg.tick(), visibility.subscribe());
        let city = CityOrchestrator::start(sources.prayer, sources.content, cfg.cities(), city_key);

        let midnight = match city.reload_trigger() {
            Some(trigger) => MidnightScheduler::start(Arc::clone(&wall), move || trigger.reload()),
            None => MidnightScheduler::start(Arc::clone(&wall), || {}),
        };
        let weather = WeatherPolicy::start(
            sources.weather,
            wall,
            cfg.weather_settings(),
            city.weather_key(),
            visibility.subscribe(),
        );
        let footer = FooterTicker::start(layout, cfg.rotation_interval(), city.subscribe());

        Self { clock, midnight, city, weather, footer, layout }
    }

    pub fn clock(&self) -> watch::Receiver<DateTime<Local>> {
        self.clock.subscribe()
    }

    pub fn city(&self) -> watch::Receiver<CityContext> {
        self.city.subscribe()
    }

    pub fn weather(&self) -> watch::Receiver<WeatherState> {
        self.weather.subscribe()
    }

    pub fn footer(&self) -> watch::Receiver<FooterState> {
        self.footer.subscribe()
    }

    /// Switch to another city. All city derived state is replaced.
    pub async fn set_city(&self, key: &str) {
        self.city.set_city(key).await;
    }

    /// Reload city data and weather now.
    pub async fn refresh(&self) {
        self.city.refresh().await;
        self.weather.refresh().await;
    }

    /// Current page as text.
    pub fn frame(&self) -> String {
        let city = self.city.context();
        let weather = self.weather.state();
        let footer = self.footer.state();
        render_frame(&FrameInput {
            now: self.clock.now(),
            instant: Instant::now(),
            city: &city,
            weather: &weather,
            footer: &footer,
            layout: &self.layout,
        })
    }

    /// Stop every timer and wait for the tasks to finish.
    pub async fn shutdown(mut self) {
        info!("Shutting down session");
        self.footer.stop().await;
        self.weather.stop().await;
        self.midnight.stop().await;
        self.city.stop().await;
        self.clock.stop().await;
        info!("Session stopped.");
    }
}
