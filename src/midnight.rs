/*
 *  midnight.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  One-shot timer that fires at local midnight and re-arms itself
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

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone};
use log::{error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::WallClock;

// a day never has more than 25 hours, a gap never spans more than one
const MAX_GAP_PROBE_MINUTES: i64 = 24 * 60;

/// The next local midnight strictly after `now`, in the zone of `now`.
///
/// The date arithmetic runs on the local calendar, so 23 and 25 hour days
/// still land on 00:00. A midnight swallowed by a DST gap resolves to the
/// first valid minute after the gap, an ambiguous one to its earliest
/// occurrence.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return now.clone() + chrono::Duration::days(1);
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            for minute in 1..=MAX_GAP_PROBE_MINUTES {
                let probe = midnight + chrono::Duration::minutes(minute);
                if let Some(t) = tz.from_local_datetime(&probe).earliest() {
                    return t;
                }
            }
            now.clone() + chrono::Duration::days(1)
        }
    }
}

/// Time left until [`next_local_midnight`].
pub fn delay_until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    (next_local_midnight(now) - now.clone()).to_std().unwrap_or(Duration::ZERO)
}

/// Fires `callback` at every local midnight until stopped.
pub struct MidnightScheduler {
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MidnightScheduler {
    pub fn start<F>(clock: Arc<dyn WallClock>, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut last_fired: Option<NaiveDate> = None;
            loop {
                let now = clock.now();
                let target = next_local_midnight(&now);
                let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
                log::debug!("Next midnight refresh in {:?}", delay);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let woke = clock.now();
                        if woke < target {
                            // early wake-up, aim again
                            continue;
                        }
                        let today = woke.date_naive();
                        if last_fired == Some(today) {
                            continue;
                        }
                        info!("Midnight rollover to {}", today);
                        last_fired = Some(today);
                        callback();
                    }
                    _ = stop_rx.recv() => {
                        info!("Midnight scheduler received stop signal. Exiting.");
                        break;
                    }
                }
            }
        });

        Self { stop_sender: Some(stop_tx), handle: Some(handle) }
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Midnight scheduler failed to join: {}", e));
        }
    }
}

impl Drop for MidnightScheduler {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
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
    use chrono::{FixedOffset, Local, Timelike};

    #[test]
    fn test_next_midnight_fixed_offset() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 6, 10, 13, 45, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(next, tz.with_ymd_and_hms(2026, 6, 11, 0, 0, 0).unwrap());
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(10 * 3600 + 15 * 60));
    }

    #[test]
    fn test_exactly_midnight_targets_following_day() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = tz.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(next_local_midnight(&now), tz.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_midnight_in_dst_gap_resolves_after_gap() {
        // Havana springs forward at 00:00, 8 March 2026 starts at 01:00
        let tz = chrono_tz::America::Havana;
        let now = tz.with_ymd_and_hms(2026, 3, 7, 20, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(next.naive_local(), NaiveDate::from_ymd_opt(2026, 3, 8).unwrap().and_hms_opt(1, 0, 0).unwrap());
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(4 * 3600));

        let tz = chrono_tz::America::Santiago;
        let now = tz.with_ymd_and_hms(2026, 9, 5, 22, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(next.naive_local(), NaiveDate::from_ymd_opt(2026, 9, 6).unwrap().and_hms_opt(1, 0, 0).unwrap());
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(2 * 3600));
    }

    #[test]
    fn test_ambiguous_midnight_takes_earliest() {
        // Havana falls back from 01:00 to 00:00 on 1 November 2026
        let tz = chrono_tz::America::Havana;
        let midnight = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap().and_time(NaiveTime::MIN);
        let LocalResult::Ambiguous(earliest, latest) = tz.from_local_datetime(&midnight) else {
            panic!("midnight of 1 Nov 2026 is not ambiguous in Havana");
        };

        let now = tz.with_ymd_and_hms(2026, 10, 31, 20, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(next, earliest);
        assert!(next < latest);
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(4 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_midnight_then_a_day_later() {
        let base = Local.with_ymd_and_hms(2026, 6, 10, 23, 59, 59).single().unwrap()
            + chrono::Duration::milliseconds(500);
        let wall = Arc::new(AnchoredClock::new(base));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let probe = wall.clone();
        let mut scheduler = MidnightScheduler::start(wall.clone(), move || {
            let _ = tx.send(probe.now());
        });

        let first = rx.recv().await.unwrap();
        let midnight = Local.with_ymd_and_hms(2026, 6, 11, 0, 0, 0).single().unwrap();
        let late = (first - midnight).num_milliseconds();
        assert!((0..=2).contains(&late), "fired {late}ms after midnight");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.date_naive(), first.date_naive().succ_opt().unwrap());
        assert_eq!(second.hour(), 0);
        assert_eq!(second.minute(), 0);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_fire() {
        let base = Local.with_ymd_and_hms(2026, 6, 10, 23, 0, 0).single().unwrap();
        let wall = Arc::new(AnchoredClock::new(base));
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut scheduler = MidnightScheduler::start(wall, move || {
            let _ = tx.send(());
        });
        scheduler.stop().await;
        tokio::time::advance(Duration::from_secs(2 * 3600)).await;
        // the callback (and its sender) went away with the task
        assert!(rx.recv().await.is_none());
    }
}
