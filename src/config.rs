/*
 *  config.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  YAML configuration layered under command line overrides
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

use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::scroll::{ScrollMode, ScrollTiming};
use crate::weather::WeatherSettings;

pub const DEFAULT_CITY: &str = "hannover";

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// One mosque/city the kiosk can show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    pub mosque_name: String,
    /// primary prayer time document
    pub prayer_source: String,
    /// consulted when the primary fails
    pub fallback_source: String,
    /// lookup name for the weather provider, no weather card without it
    #[serde(default)]
    pub weather_city_name: Option<String>,
}

/// How the frame is put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// redraw the terminal every tick
    #[default]
    Terminal,
    /// one log line per frame change
    Log,
    /// no output, for headless runs
    None,
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    /// start page, as a city key or a path such as "/braunschweig"
    pub city: Option<String>,
    pub tick_ms: Option<u64>,
    pub rotation_secs: Option<u64>,
    pub render: Option<RenderMode>,
    pub footer: Option<FooterConfig>,
    pub weather: Option<WeatherConfig>,
    pub sources: Option<SourcesConfig>,
    pub cities: Option<BTreeMap<String, CityConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FooterConfig {
    pub scroll_mode: Option<ScrollMode>,
    pub columns: Option<u32>,
    pub rows: Option<u32>,
    pub line_px: Option<u32>,
    pub pause_ms: Option<u64>,
    pub step_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeatherConfig {
    pub refresh_mins: Option<u64>,
    pub ttl_mins: Option<u64>,
    pub lang: Option<String>,
}

/// Endpoints and HTTP behaviour. Replaced as a block when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub content_url: String,
    pub weather_url: String,
    pub weather_api_key: String,
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
    pub max_retries: u8,
    pub retry_delay_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            content_url: "http://localhost:8080/content/daily.json".into(),
            weather_url: "https://api.openweathermap.org/data/2.5/weather".into(),
            weather_api_key: String::new(),
            connect_timeout_ms: 2_000,
            timeout_ms: 8_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

/// Built-in city table, used when the YAML has no `cities:` block.
pub fn default_cities() -> BTreeMap<String, CityConfig> {
    let city = |key: &str, mosque: &str, weather: &str| {
        (
            key.to_string(),
            CityConfig {
                mosque_name: mosque.to_string(),
                prayer_source: format!("http://localhost:8080/prayer/{key}.json"),
                fallback_source: format!("http://localhost:8080/prayer/{key}-fallback.json"),
                weather_city_name: Some(weather.to_string()),
            },
        )
    };
    BTreeMap::from([
        city("hannover", "Hannover Merkez Camii", "Hannover"),
        city("braunschweig", "Braunschweig Camii", "Braunschweig"),
    ])
}

/// Effective footer layout and scroll behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FooterLayout {
    pub mode: ScrollMode,
    pub columns: u32,
    pub rows: u32,
    pub line_px: u32,
    pub timing: ScrollTiming,
}

impl Config {
    pub fn cities(&self) -> BTreeMap<String, CityConfig> {
        self.cities.clone().unwrap_or_else(default_cities)
    }

    pub fn city(&self, key: &str) -> Option<CityConfig> {
        match &self.cities {
            Some(map) => map.get(key).cloned(),
            None => default_cities().remove(key),
        }
    }

    pub fn start_path(&self) -> String {
        self.city.clone().unwrap_or_default()
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.unwrap_or(1_000))
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_secs.unwrap_or(20))
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render.unwrap_or_default()
    }

    pub fn weather_settings(&self) -> WeatherSettings {
        let defaults = WeatherSettings::default();
        let w = self.weather.clone().unwrap_or_default();
        WeatherSettings {
            refresh: w.refresh_mins.map(|m| Duration::from_secs(m * 60)).unwrap_or(defaults.refresh),
            ttl: w.ttl_mins.map(|m| Duration::from_secs(m * 60)).unwrap_or(defaults.ttl),
        }
    }

    pub fn weather_lang(&self) -> String {
        self.weather
            .as_ref()
            .and_then(|w| w.lang.clone())
            .unwrap_or_else(|| "de".to_string())
    }

    pub fn sources(&self) -> SourcesConfig {
        self.sources.clone().unwrap_or_default()
    }

    pub fn footer_layout(&self) -> FooterLayout {
        let f = self.footer.clone().unwrap_or_default();
        let base = ScrollTiming::default();
        FooterLayout {
            mode: f.scroll_mode.unwrap_or_default(),
            columns: f.columns.unwrap_or(60),
            rows: f.rows.unwrap_or(3),
            line_px: f.line_px.unwrap_or(16),
            timing: ScrollTiming {
                pause: f.pause_ms.map(Duration::from_millis).unwrap_or(base.pause),
                step_interval: f.step_ms.map(Duration::from_millis).unwrap_or(base.step_interval),
                ..base
            },
        }
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "vakitmatik", about = "Vakitmatik prayer times kiosk", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// City key or path to open, e.g. "braunschweig" or "/hannover"
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub tick_ms: Option<u64>,
    #[arg(long)]
    pub weather_refresh_mins: Option<u64>,
    #[arg(long)]
    pub weather_ttl_mins: Option<u64>,
    #[arg(long)]
    pub rotation_secs: Option<u64>,
    #[arg(long)]
    pub weather_lang: Option<String>,
    #[arg(long, value_enum)]
    pub render: Option<RenderMode>,
    /// verbose logging
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    pub debug: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Read YAML, merge, apply overrides and validate. The caller handles
/// `--dump-config`.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Pretty YAML of the effective config.
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/vakitmatik/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/vakitmatik/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/vakitmatik.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["vakitmatik.yaml", "config.yaml", "config/vakitmatik.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
pub fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    if src.city.is_some()           { dst.city = src.city; }
    if src.tick_ms.is_some()        { dst.tick_ms = src.tick_ms; }
    if src.rotation_secs.is_some()  { dst.rotation_secs = src.rotation_secs; }
    if src.render.is_some()         { dst.render = src.render; }
    if src.sources.is_some()        { dst.sources = src.sources; }
    if src.cities.is_some()         { dst.cities = src.cities; }
    // footer
    match (&mut dst.footer, src.footer) {
        (None, Some(c)) => dst.footer = Some(c),
        (Some(d), Some(s)) => merge_footer(d, s),
        _ => {}
    }
    // weather
    match (&mut dst.weather, src.weather) {
        (None, Some(c)) => dst.weather = Some(c),
        (Some(d), Some(s)) => merge_weather(d, s),
        _ => {}
    }
}

fn merge_footer(dst: &mut FooterConfig, src: FooterConfig) {
    if src.scroll_mode.is_some() { dst.scroll_mode = src.scroll_mode; }
    if src.columns.is_some()     { dst.columns = src.columns; }
    if src.rows.is_some()        { dst.rows = src.rows; }
    if src.line_px.is_some()     { dst.line_px = src.line_px; }
    if src.pause_ms.is_some()    { dst.pause_ms = src.pause_ms; }
    if src.step_ms.is_some()     { dst.step_ms = src.step_ms; }
}

fn merge_weather(dst: &mut WeatherConfig, src: WeatherConfig) {
    if src.refresh_mins.is_some() { dst.refresh_mins = src.refresh_mins; }
    if src.ttl_mins.is_some()     { dst.ttl_mins = src.ttl_mins; }
    if src.lang.is_some()         { dst.lang = src.lang; }
}

pub fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()     { cfg.log_level = cli.log_level.clone(); }
    if cli.city.is_some()          { cfg.city = cli.city.clone(); }
    if cli.tick_ms.is_some()       { cfg.tick_ms = cli.tick_ms; }
    if cli.rotation_secs.is_some() { cfg.rotation_secs = cli.rotation_secs; }
    if cli.render.is_some()        { cfg.render = cli.render; }

    let any_weather = cli.weather_refresh_mins.is_some()
        || cli.weather_ttl_mins.is_some()
        || cli.weather_lang.is_some();

    if any_weather && cfg.weather.is_none() {
        cfg.weather = Some(WeatherConfig::default());
    }
    if let Some(weather) = cfg.weather.as_mut() {
        if cli.weather_refresh_mins.is_some() { weather.refresh_mins = cli.weather_refresh_mins; }
        if cli.weather_ttl_mins.is_some()     { weather.ttl_mins = cli.weather_ttl_mins; }
        if cli.weather_lang.is_some()         { weather.lang = cli.weather_lang.clone(); }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(ms) = cfg.tick_ms {
        if ms == 0 {
            return Err(ConfigError::Validation("tick_ms must be > 0".into()));
        }
    }
    if cfg.rotation_secs == Some(0) {
        return Err(ConfigError::Validation("rotation_secs must be > 0".into()));
    }
    if let Some(weather) = cfg.weather.as_ref() {
        if weather.refresh_mins == Some(0) || weather.ttl_mins == Some(0) {
            return Err(ConfigError::Validation("weather refresh_mins/ttl_mins must be > 0".into()));
        }
    }
    if let Some(footer) = cfg.footer.as_ref() {
        if footer.columns == Some(0) || footer.rows == Some(0) || footer.line_px == Some(0) {
            return Err(ConfigError::Validation("footer columns/rows/line_px must be > 0".into()));
        }
        if footer.step_ms == Some(0) {
            return Err(ConfigError::Validation("footer step_ms must be > 0".into()));
        }
    }
    if let Some(cities) = cfg.cities.as_ref() {
        if cities.is_empty() {
            return Err(ConfigError::Validation("cities must not be empty".into()));
        }
        for (key, city) in cities {
            if key.is_empty() || key.contains('/') {
                return Err(ConfigError::Validation(format!("bad city key {key:?}")));
            }
            if city.prayer_source.trim().is_empty() {
                return Err(ConfigError::Validation(format!("city {key}: prayer_source is empty")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.tick(), Duration::from_secs(1));
        assert_eq!(cfg.rotation_interval(), Duration::from_secs(20));
        assert_eq!(cfg.weather_settings(), WeatherSettings::default());
        assert_eq!(cfg.weather_lang(), "de");
        assert!(cfg.city(DEFAULT_CITY).is_some());
        assert!(cfg.city("braunschweig").is_some());
        assert!(cfg.city("berlin").is_none());
        assert_eq!(cfg.footer_layout().mode, ScrollMode::Step);
    }

    #[test]
    fn test_yaml_cities_replace_defaults() {
        let cfg = parse_yaml(
            r#"
cities:
  wolfsburg:
    mosque_name: Wolfsburg Camii
    prayer_source: http://vakit.local/wolfsburg.json
    fallback_source: http://vakit.local/wolfsburg-table.json
"#,
        )
        .unwrap();
        assert!(cfg.city("wolfsburg").is_some());
        assert!(cfg.city("hannover").is_none());
        assert_eq!(cfg.city("wolfsburg").unwrap().weather_city_name, None);
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_merge_and_cli_precedence() {
        let mut cfg = parse_yaml("tick_ms: 500\nweather:\n  refresh_mins: 5\n  lang: tr\nfooter:\n  scroll_mode: marquee\n").unwrap();
        let file = parse_yaml("weather:\n  ttl_mins: 3\n").unwrap();
        merge(&mut cfg, file);
        let cli = Cli { weather_refresh_mins: Some(30), city: Some("/braunschweig".into()), ..Cli::default() };
        apply_cli_overrides(&mut cfg, &cli);

        assert_eq!(cfg.tick(), Duration::from_millis(500));
        let w = cfg.weather_settings();
        assert_eq!(w.refresh, Duration::from_secs(30 * 60));
        assert_eq!(w.ttl, Duration::from_secs(3 * 60));
        assert_eq!(cfg.weather_lang(), "tr");
        assert_eq!(cfg.start_path(), "/braunschweig");
        assert_eq!(cfg.footer_layout().mode, ScrollMode::Marquee);
    }

    #[test]
    fn test_validation_rejects_zero_intervals() {
        let mut cfg = Config { tick_ms: Some(0), ..Config::default() };
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));
        cfg.tick_ms = None;
        cfg.weather = Some(WeatherConfig { ttl_mins: Some(0), ..WeatherConfig::default() });
        assert!(validate(&cfg).is_err());
        cfg.weather = None;
        cfg.cities = Some(BTreeMap::new());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_dump_roundtrips() {
        let cfg = Config { rotation_secs: Some(30), render: Some(RenderMode::Log), ..Config::default() };
        let yaml = dump(&cfg).unwrap();
        let back = parse_yaml(&yaml).unwrap();
        assert_eq!(back.rotation_secs, Some(30));
        assert_eq!(back.render, Some(RenderMode::Log));
    }
}
