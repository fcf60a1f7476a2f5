/*
 *  sources.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Contracts for the external data sources
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

pub mod http;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::content::DailyContentSet;
use crate::error::FetchError;
use crate::prayer::PrayerTimeSet;
use crate::weather::WeatherSnapshot;

/// Prayer times for today. Any fallback between the two locations happens
/// inside the implementation, callers see a single settle.
pub trait PrayerTimeSource: Send + Sync + 'static {
    fn fetch_prayer_times(
        &self,
        primary: &str,
        fallback: &str,
    ) -> impl Future<Output = Result<PrayerTimeSet, FetchError>> + Send;
}

/// The global daily content feed.
pub trait DailyContentSource: Send + Sync + 'static {
    fn fetch_daily_content(&self) -> impl Future<Output = Result<DailyContentSet, FetchError>> + Send;
}

/// Current weather for a city name. Implementations should give up with
/// [`FetchError::Cancelled`] once `cancel` fires.
pub trait WeatherSource: Send + Sync + 'static {
    fn fetch_weather(
        &self,
        city: &str,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<WeatherSnapshot, FetchError>> + Send;
}
