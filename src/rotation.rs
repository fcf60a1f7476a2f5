/*
 *  rotation.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Footer content rotation: a cursor that survives its collection changing
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

use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(20);

/// Index into a collection whose length may change under it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationCursor {
    index: usize,
    len: usize,
}

impl RotationCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adopt a new collection length, keeping the index in range.
    /// Returns true when the active index moved.
    pub fn set_len(&mut self, len: usize) -> bool {
        let before = self.index;
        self.len = len;
        self.index = if len == 0 { 0 } else { before % len };
        self.index != before
    }

    /// Step to the next item, wrapping to 0. No-op on an empty collection.
    pub fn advance(&mut self) -> bool {
        if self.len == 0 {
            return false;
        }
        let before = self.index;
        self.index = (self.index + 1) % self.len;
        self.index != before
    }
}

/// What the footer reads: the cursor plus an epoch that bumps whenever the
/// shown item may have changed, which is the auto-scroll reset trigger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub cursor: RotationCursor,
    pub item_epoch: u64,
}

impl RotationState {
    /// Active index, or `None` when there is nothing to show.
    pub fn active(&self) -> Option<usize> {
        (!self.cursor.is_empty()).then_some(self.cursor.index())
    }
}

/// Advances a [`RotationCursor`] on a fixed interval.
///
/// The collection is observed through a watch channel; any new value
/// re-clamps the cursor and restarts the interval so a fresh collection
/// gets a full period on its first item.
pub struct RotationTimer {
    rx: watch::Receiver<RotationState>,
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RotationTimer {
    pub fn start<T, F>(period: Duration, mut items: watch::Receiver<T>, len_of: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> usize + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let initial = RotationState {
            cursor: RotationCursor::new(len_of(&*items.borrow_and_update())),
            item_epoch: 0,
        };
        let (tx, rx) = watch::channel(initial);
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut state = initial;
            let mut items_open = true;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if state.cursor.advance() {
                            state.item_epoch += 1;
                            tx.send_replace(state);
                        }
                    }
                    changed = items.changed(), if items_open => {
                        if changed.is_err() {
                            items_open = false;
                            continue;
                        }
                        let len = len_of(&*items.borrow_and_update());
                        state.cursor.set_len(len);
                        // new collection, the item at this index is not the one shown before
                        state.item_epoch += 1;
                        debug!("Rotation collection changed: len={} index={}", len, state.cursor.index());
                        tx.send_replace(state);
                        ticker.reset();
                    }
                    _ = stop_rx.recv() => {
                        info!("Rotation timer received stop signal. Exiting.");
                        break;
                    }
                }
            }
        });

        Self { rx, stop_sender: Some(stop_tx), handle: Some(handle) }
    }

    pub fn subscribe(&self) -> watch::Receiver<RotationState> {
        self.rx.clone()
    }

    pub fn state(&self) -> RotationState {
        *self.rx.borrow()
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Rotation timer failed to join: {}", e));
        }
    }
}

impl Drop for RotationTimer {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
