/*
 *  sources/http.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  reqwest backed implementations of the data sources
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

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use reqwest::{header, Client};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::clock::WallClock;
use crate::config::SourcesConfig;
use crate::content::{ContentItem, DailyContentSet};
use crate::error::FetchError;
use crate::prayer::{PrayerTimeSet, PrayerTimesPayload};
use crate::sources::{DailyContentSource, PrayerTimeSource, WeatherSource};
use crate::weather::{WeatherPayload, WeatherSnapshot};

const VERSION: &str = concat!("Vakitmatik ", env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

/// Try to decode as gzip first, fall back to plain text.
fn decode_body(raw: &[u8]) -> String {
    let mut decoder = GzDecoder::new(raw);
    let mut decoded = String::new();
    match decoder.read_to_string(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => String::from_utf8_lossy(raw).to_string(),
    }
}

/// A prayer document is either a table of payloads keyed by ISO date or a
/// single day's payload. Order matters, every object parses as a day.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PrayerDocument {
    Table(HashMap<String, PrayerTimesPayload>),
    Day(PrayerTimesPayload),
}

impl PrayerDocument {
    fn for_date(self, date: NaiveDate) -> Result<PrayerTimeSet, FetchError> {
        match self {
            PrayerDocument::Day(payload) => PrayerTimeSet::try_from(payload),
            PrayerDocument::Table(mut table) => {
                let key = date.format("%Y-%m-%d").to_string();
                let payload = table
                    .remove(&key)
                    .ok_or_else(|| FetchError::Payload(format!("no prayer times for {}", key)))?;
                PrayerTimeSet::try_from(payload)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentDocument {
    Wrapped(DailyContentSet),
    Bare(Vec<ContentItem>),
}

impl From<ContentDocument> for DailyContentSet {
    fn from(doc: ContentDocument) -> Self {
        match doc {
            ContentDocument::Wrapped(set) => set,
            ContentDocument::Bare(items) => DailyContentSet { items },
        }
    }
}

/// Only gzip is advertised, [`decode_body`] understands nothing else.
fn default_headers() -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(VERSION));
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    headers.insert(header::ACCEPT_ENCODING, header::HeaderValue::from_static("gzip"));
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("close"));
    headers
}

/// All three sources over one shared HTTP client.
#[derive(Clone)]
pub struct HttpSources {
    client: Client,
    clock: Arc<dyn WallClock>,
    content_url: String,
    weather_url: String,
    weather_api_key: String,
    weather_lang: String,
    max_retries: u8,
    retry_delay: Duration,
}

impl HttpSources {
    pub fn new(cfg: &SourcesConfig, weather_lang: &str, clock: Arc<dyn WallClock>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .default_headers(default_headers())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            clock,
            content_url: cfg.content_url.clone(),
            weather_url: cfg.weather_url.clone(),
            weather_api_key: cfg.weather_api_key.clone(),
            weather_lang: weather_lang.to_string(),
            max_retries: cfg.max_retries.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        })
    }

    async fn send_with_retries(&self, url: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut retries = 0;
        loop {
            let err = match self.client.get(url).query(params).send().await {
                Ok(response) if response.status().is_server_error() => FetchError::Status(response.status().as_u16()),
                Ok(response) if !response.status().is_success() => {
                    // client errors will not get better by asking again
                    return Err(FetchError::Status(response.status().as_u16()));
                }
                Ok(response) => {
                    let raw = response.bytes().await?;
                    return Ok(decode_body(&raw));
                }
                Err(e) => FetchError::Http(e),
            };
            retries += 1;
            if retries >= self.max_retries {
                return Err(err);
            }
            debug!("GET {} failed ({}), retry {}/{}", url, err, retries, self.max_retries);
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, FetchError> {
        let body = self.send_with_retries(url, params).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_prayer_document(&self, url: &str) -> Result<PrayerTimeSet, FetchError> {
        let doc: PrayerDocument = self.get_json(url, &[]).await?;
        doc.for_date(self.clock.now().date_naive())
    }
}

impl PrayerTimeSource for HttpSources {
    async fn fetch_prayer_times(&self, primary: &str, fallback: &str) -> Result<PrayerTimeSet, FetchError> {
        match self.fetch_prayer_document(primary).await {
            Ok(set) => Ok(set),
            Err(e) => {
                warn!("Primary prayer source failed ({}), trying fallback", e);
                let set = self.fetch_prayer_document(fallback).await?;
                info!("Prayer times loaded from fallback source");
                Ok(set)
            }
        }
    }
}

impl DailyContentSource for HttpSources {
    async fn fetch_daily_content(&self) -> Result<DailyContentSet, FetchError> {
        let doc: ContentDocument = self.get_json(&self.content_url, &[]).await?;
        Ok(doc.into())
    }
}

impl WeatherSource for HttpSources {
    async fn fetch_weather(&self, city: &str, cancel: CancellationToken) -> Result<WeatherSnapshot, FetchError> {
        let params = [
            ("q", city),
            ("appid", self.weather_api_key.as_str()),
            ("units", "metric"),
            ("lang", self.weather_lang.as_str()),
        ];
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            payload = self.get_json::<WeatherPayload>(&self.weather_url, &params) => {
                WeatherSnapshot::try_from(payload?)
            }
        }
    }
}
