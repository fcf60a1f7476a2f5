/*
 *  prayer.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Prayer time set, current prayer and countdown
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

use std::fmt;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

const DAY: i64 = 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerKey {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerKey {
    /// Day order.
    pub const ALL: [PrayerKey; 6] = [
        PrayerKey::Fajr,
        PrayerKey::Sunrise,
        PrayerKey::Dhuhr,
        PrayerKey::Asr,
        PrayerKey::Maghrib,
        PrayerKey::Isha,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Tile caption shown under the icon.
    pub fn label(self) -> &'static str {
        match self {
            PrayerKey::Fajr => "İmsak",
            PrayerKey::Sunrise => "Güneş",
            PrayerKey::Dhuhr => "Öğle",
            PrayerKey::Asr => "İkindi",
            PrayerKey::Maghrib => "Akşam",
            PrayerKey::Isha => "Yatsı",
        }
    }

    pub fn arabic_title(self) -> &'static str {
        match self {
            PrayerKey::Fajr => "الصلاة الفجر",
            PrayerKey::Sunrise => "الشروق",
            PrayerKey::Dhuhr => "الصلاة الظهر",
            PrayerKey::Asr => "الصلاة العصر",
            PrayerKey::Maghrib => "الصلاة المغرب",
            PrayerKey::Isha => "الصلاة العشاء",
        }
    }

    pub fn latin_title(self) -> &'static str {
        match self {
            PrayerKey::Fajr => "Fajr",
            PrayerKey::Sunrise => "Shuruq",
            PrayerKey::Dhuhr => "Dhuhr",
            PrayerKey::Asr => "Asr",
            PrayerKey::Maghrib => "Maghrib",
            PrayerKey::Isha => "Isha'a",
        }
    }

    /// Titles alternate between Arabic and Latin every 3 seconds.
    pub fn title_at(self, second: u32) -> &'static str {
        if (second / 3) % 2 == 0 {
            self.arabic_title()
        } else {
            self.latin_title()
        }
    }
}

impl fmt::Display for PrayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.latin_title())
    }
}

/// Wire shape delivered by the prayer time sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerTimesPayload {
    pub fajr: Option<String>,
    pub sunrise: Option<String>,
    pub dhuhr: Option<String>,
    pub asr: Option<String>,
    pub maghrib: Option<String>,
    pub isha: Option<String>,
    pub hijri_date_long: Option<String>,
    pub gregorian_date_short: Option<String>,
}

/// A complete day of prayer times. There is no partial set: either all six
/// times parsed or the payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerTimeSet {
    times: [NaiveTime; 6],
    pub hijri_date_long: Option<String>,
    pub gregorian_date_short: Option<String>,
}

fn parse_hhmm(key: PrayerKey, raw: Option<&str>) -> Result<NaiveTime, FetchError> {
    let raw = raw.ok_or_else(|| FetchError::Payload(format!("missing {} time", key)))?;
    // some feeds append seconds or a timezone suffix, the first five chars are HH:MM
    let head = raw.trim().get(..5).unwrap_or(raw.trim());
    NaiveTime::parse_from_str(head, "%H:%M")
        .map_err(|e| FetchError::Payload(format!("bad {} time {:?}: {}", key, raw, e)))
}

impl TryFrom<PrayerTimesPayload> for PrayerTimeSet {
    type Error = FetchError;

    fn try_from(p: PrayerTimesPayload) -> Result<Self, Self::Error> {
        let times = [
            parse_hhmm(PrayerKey::Fajr, p.fajr.as_deref())?,
            parse_hhmm(PrayerKey::Sunrise, p.sunrise.as_deref())?,
            parse_hhmm(PrayerKey::Dhuhr, p.dhuhr.as_deref())?,
            parse_hhmm(PrayerKey::Asr, p.asr.as_deref())?,
            parse_hhmm(PrayerKey::Maghrib, p.maghrib.as_deref())?,
            parse_hhmm(PrayerKey::Isha, p.isha.as_deref())?,
        ];
        // isha may fall after midnight in high latitude summers
        let isha_in_order = times[5] > times[4] || times[5] < times[0];
        if times[..5].windows(2).any(|w| w[0] >= w[1]) || !isha_in_order {
            return Err(FetchError::Payload("prayer times out of order".into()));
        }
        Ok(Self {
            times,
            hijri_date_long: p.hijri_date_long.filter(|s| !s.trim().is_empty()),
            gregorian_date_short: p.gregorian_date_short.filter(|s| !s.trim().is_empty()),
        })
    }
}

impl PrayerTimeSet {
    pub fn time(&self, key: PrayerKey) -> NaiveTime {
        self.times[key.index()]
    }

    /// "HH:MM" as shown on the tiles.
    pub fn display(&self, key: PrayerKey) -> String {
        self.time(key).format("%H:%M").to_string()
    }

    /// Seconds of each prayer on a timeline starting at fajr. A wrapped isha
    /// lands past 24h.
    fn timeline(&self) -> [i64; 6] {
        let mut points = self.times.map(|t| i64::from(t.num_seconds_from_midnight()));
        if points[5] < points[0] {
            points[5] += DAY;
        }
        points
    }

    /// Where `now` sits in the day. Before fajr the current prayer is still
    /// the previous evening's isha, or maghrib when isha is after midnight.
    pub fn phase_at(&self, now: NaiveTime) -> PrayerPhase {
        let points = self.timeline();
        let mut now_s = i64::from(now.num_seconds_from_midnight());
        if now_s < points[0] {
            now_s += DAY; // still yesterday's cycle
        }

        let current_idx = points.iter().rposition(|p| *p <= now_s).unwrap_or(0);
        let next_idx = (current_idx + 1) % 6;
        let start = points[current_idx];
        let end = if next_idx == 0 { points[0] + DAY } else { points[next_idx] };

        let span = (end - start).max(1);
        let elapsed = (now_s - start).clamp(0, span);
        let left = (end - now_s).max(0);

        PrayerPhase {
            current: PrayerKey::ALL[current_idx],
            next: PrayerKey::ALL[next_idx],
            countdown: Duration::from_secs(left as u64),
            progress_percent: ((elapsed as f64 / span as f64) * 100.0).clamp(0.0, 100.0),
        }
    }
}

/// Current prayer, the one after it and how far along we are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrayerPhase {
    pub current: PrayerKey,
    pub next: PrayerKey,
    pub countdown: Duration,
    pub progress_percent: f64,
}

impl PrayerPhase {
    /// "-HH:MM" while an hour or more is left, "-MM:SS" below that.
    pub fn diff_label_short(&self) -> String {
        let total = self.countdown.as_secs();
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        if h > 0 {
            format!("-{:02}:{:02}", h, m)
        } else {
            format!("-{:02}:{:02}", m, s)
        }
    }

    /// The tile turns red in the last tenth of the interval.
    pub fn is_ending(&self) -> bool {
        self.progress_percent > 90.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PrayerTimesPayload {
        PrayerTimesPayload {
            fajr: Some("05:10".into()),
            sunrise: Some("06:45".into()),
            dhuhr: Some("13:20".into()),
            asr: Some("17:05".into()),
            maghrib: Some("19:50".into()),
            isha: Some("21:20".into()),
            hijri_date_long: Some("14 Rabiʻ II 1448".into()),
            gregorian_date_short: Some("16.10.2026".into()),
        }
    }

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_payload_all_or_nothing() {
        let set = PrayerTimeSet::try_from(payload()).unwrap();
        assert_eq!(set.display(PrayerKey::Asr), "17:05");
        assert_eq!(set.hijri_date_long.as_deref(), Some("14 Rabiʻ II 1448"));

        let mut missing = payload();
        missing.maghrib = None;
        assert!(PrayerTimeSet::try_from(missing).is_err());

        let mut garbage = payload();
        garbage.dhuhr = Some("noon".into());
        assert!(PrayerTimeSet::try_from(garbage).is_err());
    }

    #[test]
    fn test_seconds_suffix_is_tolerated() {
        let mut p = payload();
        p.fajr = Some("05:10:00".into());
        p.hijri_date_long = Some("  ".into());
        let set = PrayerTimeSet::try_from(p).unwrap();
        assert_eq!(set.time(PrayerKey::Fajr), t(5, 10, 0));
        assert_eq!(set.hijri_date_long, None);
    }

    #[test]
    fn test_payload_json_shape() {
        let json = r#"{"fajr":"05:10","sunrise":"06:45","dhuhr":"13:20","asr":"17:05",
            "maghrib":"19:50","isha":"21:20","hijriDateLong":"x","gregorianDateShort":"y"}"#;
        let p: PrayerTimesPayload = serde_json::from_str(json).unwrap();
        let set = PrayerTimeSet::try_from(p).unwrap();
        assert_eq!(set.gregorian_date_short.as_deref(), Some("y"));
    }

    #[test]
    fn test_phase_during_the_day() {
        let set = PrayerTimeSet::try_from(payload()).unwrap();
        let phase = set.phase_at(t(15, 12, 30));
        assert_eq!(phase.current, PrayerKey::Dhuhr);
        assert_eq!(phase.next, PrayerKey::Asr);
        assert_eq!(phase.countdown, Duration::from_secs(3600 + 52 * 60 + 30));
        assert_eq!(phase.diff_label_short(), "-01:52");
        assert!((phase.progress_percent - 50.0).abs() < 0.5);
    }

    #[test]
    fn test_phase_wraps_over_midnight() {
        let set = PrayerTimeSet::try_from(payload()).unwrap();

        let late = set.phase_at(t(23, 0, 0));
        assert_eq!(late.current, PrayerKey::Isha);
        assert_eq!(late.next, PrayerKey::Fajr);
        assert_eq!(late.countdown, Duration::from_secs(6 * 3600 + 10 * 60));

        let early = set.phase_at(t(4, 40, 0));
        assert_eq!(early.current, PrayerKey::Isha);
        assert_eq!(early.next, PrayerKey::Fajr);
        assert_eq!(early.diff_label_short(), "-30:00");
        assert!(early.is_ending());
    }

    #[test]
    fn test_isha_after_midnight() {
        let mut p = payload();
        p.fajr = Some("02:55".into());
        p.sunrise = Some("04:40".into());
        p.maghrib = Some("21:50".into());
        p.isha = Some("00:10".into());
        let set = PrayerTimeSet::try_from(p).unwrap();
        assert_eq!(set.display(PrayerKey::Isha), "00:10");

        let evening = set.phase_at(t(23, 0, 0));
        assert_eq!(evening.current, PrayerKey::Maghrib);
        assert_eq!(evening.next, PrayerKey::Isha);
        assert_eq!(evening.countdown, Duration::from_secs(3600 + 10 * 60));

        let before_isha = set.phase_at(t(0, 5, 0));
        assert_eq!(before_isha.current, PrayerKey::Maghrib);
        assert_eq!(before_isha.diff_label_short(), "-05:00");

        let night = set.phase_at(t(1, 10, 0));
        assert_eq!(night.current, PrayerKey::Isha);
        assert_eq!(night.next, PrayerKey::Fajr);
        assert_eq!(night.countdown, Duration::from_secs(3600 + 45 * 60));
        assert!((night.progress_percent - 100.0 / 2.75 * 1.0).abs() < 0.5);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut p = payload();
        p.asr = Some("12:00".into());
        assert!(PrayerTimeSet::try_from(p).is_err());

        // between fajr and maghrib isha is neither late nor wrapped
        let mut p = payload();
        p.isha = Some("18:00".into());
        assert!(PrayerTimeSet::try_from(p).is_err());
    }

    #[test]
    fn test_exact_prayer_time_starts_it() {
        let set = PrayerTimeSet::try_from(payload()).unwrap();
        let phase = set.phase_at(t(5, 10, 0));
        assert_eq!(phase.current, PrayerKey::Fajr);
        assert_eq!(phase.progress_percent, 0.0);
    }

    #[test]
    fn test_title_alternates_every_three_seconds() {
        assert_eq!(PrayerKey::Isha.title_at(0), PrayerKey::Isha.arabic_title());
        assert_eq!(PrayerKey::Isha.title_at(2), PrayerKey::Isha.arabic_title());
        assert_eq!(PrayerKey::Isha.title_at(3), "Isha'a");
        assert_eq!(PrayerKey::Isha.title_at(6), PrayerKey::Isha.arabic_title());
        assert_eq!(PrayerKey::Sunrise.title_at(59), "Shuruq");
    }
}
