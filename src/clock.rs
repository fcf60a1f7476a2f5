/*
 *  clock.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Drift corrected clock signal, ticks on exact boundaries
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

use chrono::{DateTime, Local, TimeZone};
use log::{debug, error, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::visibility::{Visibility, VisibilityWatch};

/// Source of local wall-clock time.
///
/// Everything that needs "now" goes through this so tests can run on
/// tokio's paused clock instead of the host clock.
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Local>;
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Wall clock that starts at `base` and then follows tokio's clock.
///
/// Under `tokio::time::pause()` it only moves when the runtime advances
/// time, which keeps timer tests deterministic.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    base: DateTime<Local>,
    anchor: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(base: DateTime<Local>) -> Self {
        Self { base, anchor: tokio::time::Instant::now() }
    }
}

impl WallClock for AnchoredClock {
    fn now(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

/// Epoch millisecond of the next tick boundary strictly after `now_ms`.
#[inline]
pub fn next_tick_boundary(now_ms: i64, granularity_ms: i64) -> i64 {
    let g = granularity_ms.max(1);
    now_ms - now_ms.rem_euclid(g) + g
}

/// How long to sleep from `now` until the next tick boundary.
pub fn delay_to_next_tick<Tz: TimeZone>(now: &DateTime<Tz>, granularity: Duration) -> Duration {
    let now_ms = now.timestamp_millis();
    let g = i64::try_from(granularity.as_millis()).unwrap_or(i64::MAX);
    let next = next_tick_boundary(now_ms, g);
    Duration::from_millis(u64::try_from(next - now_ms).unwrap_or(0))
}

/// Ticking clock signal.
///
/// A background task sleeps to each boundary rather than repeating a fixed
/// delay, so a late wake-up never accumulates. When the display becomes
/// visible again the pending sleep is dropped, the signal is refreshed at
/// once and the schedule is rebuilt from the current boundary.
pub struct DriftClock {
    rx: watch::Receiver<DateTime<Local>>,
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DriftClock {
    pub fn start(
        clock: Arc<dyn WallClock>,
        granularity: Duration,
        visibility: watch::Receiver<Visibility>,
    ) -> Self {
        let (tx, rx) = watch::channel(clock.now());
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let mut vis = VisibilityWatch::new(visibility);

        let handle = tokio::spawn(async move {
            let mut vis_open = true;
            loop {
                let delay = delay_to_next_tick(&clock.now(), granularity);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        tx.send_replace(clock.now());
                    }
                    regained = vis.regained(), if vis_open => {
                        if regained {
                            debug!("Clock resync on visibility regain");
                            tx.send_replace(clock.now());
                        } else {
                            vis_open = false;
                        }
                    }
                    _ = stop_rx.recv() => {
                        info!("Clock task received stop signal. Exiting.");
                        break;
                    }
                }
            }
        });

        Self { rx, stop_sender: Some(stop_tx), handle: Some(handle) }
    }

    pub fn subscribe(&self) -> watch::Receiver<DateTime<Local>> {
        self.rx.clone()
    }

    /// Latest emitted signal.
    pub fn now(&self) -> DateTime<Local> {
        *self.rx.borrow()
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Clock task failed to join: {}", e));
        }
    }
}

impl Drop for DriftClock {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
