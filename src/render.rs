/*
 *  render.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plain text frame of the kiosk page
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

use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::{DateTime, Local, Timelike};
use log::info;
use tokio::time::Instant;

use crate::city::CityContext;
use crate::config::{FooterLayout, RenderMode};
use crate::footer::{wrap_text, FooterState};
use crate::prayer::PrayerKey;
use crate::weather::WeatherState;

pub const FOOTER_PLACEHOLDER: &str = "loading Islamic content…";
pub const HIJRI_PLACEHOLDER: &str = "--";
pub const LABEL_PLACEHOLDER: &str = "-";
pub const PRAYER_PLACEHOLDER: &str = "loading prayer times…";
pub const TEMPERATURE_PLACEHOLDER: &str = "--°C";

const RULE: &str = "------------------------------------------------------------";

/// Everything one frame is built from.
pub struct FrameInput<'a> {
    pub now: DateTime<Local>,
    pub instant: Instant,
    pub city: &'a CityContext,
    pub weather: &'a WeatherState,
    pub footer: &'a FooterState,
    pub layout: &'a FooterLayout,
}

pub fn temperature_label(weather: &WeatherState) -> String {
    match &weather.snapshot {
        Some(w) => format!("{:.0}°C", w.temperature_c),
        None => TEMPERATURE_PLACEHOLDER.to_string(),
    }
}

pub fn render_frame(input: &FrameInput<'_>) -> String {
    let mut out = String::new();
    let city = input.city;
    let title = city
        .config
        .as_ref()
        .map_or(city.city_key.as_str(), |c| c.mosque_name.as_str());

    let _ = writeln!(out, "{:<50}{:>10}", title, input.now.format("%H:%M:%S"));
    let gregorian = city
        .gregorian_date_short
        .clone()
        .unwrap_or_else(|| input.now.format("%d.%m.%Y").to_string());
    let hijri = city.hijri_date_long.as_deref().unwrap_or(HIJRI_PLACEHOLDER);
    let _ = writeln!(out, "{}  |  {}", gregorian, hijri);

    let mut weather_line = temperature_label(input.weather);
    if let Some(w) = &input.weather.snapshot {
        let _ = write!(weather_line, "  {} ({})", w.description, w.city_name);
    }
    if let Some(e) = &input.weather.error {
        let _ = write!(weather_line, "  [{}]", e);
    }
    let _ = writeln!(out, "{}", weather_line);

    if let Some(e) = &city.error {
        let _ = writeln!(out, "! {}", e);
    }
    let _ = writeln!(out, "{}", RULE);

    for key in PrayerKey::ALL {
        let _ = write!(out, "{:>9}", key.label());
    }
    out.push('\n');
    match &city.prayer_times {
        Some(times) => {
            for key in PrayerKey::ALL {
                let _ = write!(out, "{:>9}", times.display(key));
            }
            out.push('\n');
            let phase = times.phase_at(input.now.time());
            let marker = if phase.is_ending() { "!" } else { " " };
            let _ = writeln!(
                out,
                "{}{}  {}  {:>3.0}%  next: {}",
                marker,
                phase.current.title_at(input.now.second()),
                phase.diff_label_short(),
                phase.progress_percent,
                phase.next.title_at(input.now.second()),
            );
        }
        None => {
            for _ in PrayerKey::ALL {
                let _ = write!(out, "{:>9}", LABEL_PLACEHOLDER);
            }
            out.push('\n');
            let _ = writeln!(out, " {}  {}", LABEL_PLACEHOLDER, PRAYER_PLACEHOLDER);
        }
    }
    let _ = writeln!(out, "{}", RULE);

    match &input.footer.item {
        Some(item) => {
            let _ = writeln!(out, "[{}/{}] {}", input.footer.index + 1, input.footer.len, item.title);
            let lines = wrap_text(&item.text, input.layout.columns);
            let skip = (input.footer.offset_at(input.instant) / input.layout.line_px.max(1)) as usize;
            for line in lines.iter().skip(skip).take(input.layout.rows as usize) {
                let _ = writeln!(out, "  {}", line);
            }
            if let Some(source) = &item.source {
                let _ = writeln!(out, "  - {}", source);
            }
        }
        None => {
            let _ = writeln!(out, "{}", FOOTER_PLACEHOLDER);
        }
    }
    out
}

/// Puts frames on screen according to the render mode.
pub struct FrameSink {
    mode: RenderMode,
    last_logged: Option<String>,
}

impl FrameSink {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode, last_logged: None }
    }

    pub fn present(&mut self, frame: &str) -> io::Result<()> {
        match self.mode {
            RenderMode::Terminal => {
                let mut stdout = io::stdout().lock();
                // clear and home
                write!(stdout, "\x1b[2J\x1b[H{}", frame)?;
                stdout.flush()
            }
            RenderMode::Log => {
                // the clock line changes every tick, only log the rest
                let body = frame.split_once('\n').map_or("", |(_, rest)| rest);
                if self.last_logged.as_deref() != Some(body) {
                    info!("frame:\n{}", frame);
                    self.last_logged = Some(body.to_string());
                }
                Ok(())
            }
            RenderMode::None => Ok(()),
        }
    }
}
