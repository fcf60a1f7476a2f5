/*
 *  visibility.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display visibility signal, fed by the screen blanker hooks
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

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }
}

/// Writer side of the visibility signal.
///
/// Components never look at the display themselves, they subscribe here.
/// The daemon feeds it from SIGUSR1/SIGUSR2, tests drive it directly.
#[derive(Debug, Clone)]
pub struct VisibilitySignal {
    tx: watch::Sender<Visibility>,
}

impl VisibilitySignal {
    pub fn new(initial: Visibility) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Visibility {
        *self.tx.borrow()
    }

    /// Publish a new state; repeated values are not re-announced.
    pub fn set(&self, state: Visibility) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                log::debug!("Visibility changed: {:?} -> {:?}", current, state);
                *current = state;
                true
            }
        });
    }
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}

/// Reader side, remembers the last state it saw so that a hidden -> visible
/// edge is not lost when the waiting future is dropped inside a `select!`.
#[derive(Debug)]
pub struct VisibilityWatch {
    rx: watch::Receiver<Visibility>,
    last: Visibility,
}

impl VisibilityWatch {
    pub fn new(mut rx: watch::Receiver<Visibility>) -> Self {
        let last = *rx.borrow_and_update();
        Self { rx, last }
    }

    pub fn is_visible(&self) -> bool {
        self.rx.borrow().is_visible()
    }

    /// Wait until the display goes from hidden to visible.
    ///
    /// Cancel safe. Returns `false` once the signal is gone, which callers
    /// treat as "never again".
    pub async fn regained(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let now = *self.rx.borrow_and_update();
            let was = std::mem::replace(&mut self.last, now);
            if !was.is_visible() && now.is_visible() {
                return true;
            }
        }
    }
}
