/*
 *  footer.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Rotating footer ticker: one daily content item at a time, scrolled
 *  vertically when it does not fit
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
use tokio::time::{sleep_until, Instant};

use crate::city::CityContext;
use crate::config::FooterLayout;
use crate::content::{ContentItem, DailyContentSet};
use crate::rotation::{RotationState, RotationTimer};
use crate::scroll::{AutoScroll, MarqueePlan, MarqueeTiming, ScrollMode};

/// Greedy word wrap. Words longer than a line are cut.
pub fn wrap_text(text: &str, columns: u32) -> Vec<String> {
    let width = columns.max(1) as usize;
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = line.chars().count() + usize::from(!line.is_empty()) + word.len();
            if needed > width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.extend(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// How the shown item is currently offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollView {
    Static,
    Stepping { offset: u32 },
    /// offset is a function of time, see [`MarqueePlan::offset_at`]
    Marquee { plan: MarqueePlan },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FooterState {
    pub item: Option<ContentItem>,
    pub index: usize,
    pub len: usize,
    pub scroll: ScrollView,
}

impl Default for FooterState {
    fn default() -> Self {
        Self { item: None, index: 0, len: 0, scroll: ScrollView::Static }
    }
}

impl FooterState {
    /// Pixel offset of the text at `now`.
    pub fn offset_at(&self, now: Instant) -> u32 {
        match self.scroll {
            ScrollView::Static => 0,
            ScrollView::Stepping { offset } => offset,
            ScrollView::Marquee { plan } => plan.offset_at(now),
        }
    }
}

struct Ticker {
    layout: FooterLayout,
    marquee: MarqueeTiming,
    scroll: AutoScroll,
    generation: u64,
    state: FooterState,
    tx: watch::Sender<FooterState>,
}

impl Ticker {
    fn show(&mut self, rotation: RotationState, content: &Option<DailyContentSet>, now: Instant) {
        let item = rotation
            .active()
            .and_then(|i| content.as_ref().and_then(|c| c.get_wrapped(i)))
            .cloned();
        let viewport = self.layout.rows * self.layout.line_px;
        let height = item
            .as_ref()
            .map_or(0, |it| wrap_text(&it.text, self.layout.columns).len() as u32 * self.layout.line_px);

        let scroll = match self.layout.mode {
            ScrollMode::Step => {
                self.scroll.measure(viewport, height, now);
                self.scroll.reset(now);
                if self.scroll.can_scroll() {
                    ScrollView::Stepping { offset: self.scroll.offset() }
                } else {
                    ScrollView::Static
                }
            }
            ScrollMode::Marquee => {
                self.generation += 1;
                match MarqueePlan::compute(&self.marquee, viewport, height, self.generation, now) {
                    Some(plan) => ScrollView::Marquee { plan },
                    None => ScrollView::Static,
                }
            }
        };
        debug!("Footer shows item {}/{} ({}px in {}px)", rotation.cursor.index() + 1, rotation.cursor.len(), height, viewport);

        self.state = FooterState { item, index: rotation.cursor.index(), len: rotation.cursor.len(), scroll };
        self.tx.send_replace(self.state.clone());
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self.layout.mode {
            ScrollMode::Step => self.scroll.next_deadline(),
            ScrollMode::Marquee => None,
        }
    }

    fn step(&mut self, now: Instant) {
        let offset = self.scroll.poll(now);
        if let ScrollView::Stepping { offset: shown } = self.state.scroll {
            if shown != offset {
                self.state.scroll = ScrollView::Stepping { offset };
                self.tx.send_replace(self.state.clone());
            }
        }
    }
}

/// Footer task: follows the city's daily content, rotates through it and
/// drives the scroll cycle of the shown item.
pub struct FooterTicker {
    rx: watch::Receiver<FooterState>,
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FooterTicker {
    pub fn start(layout: FooterLayout, rotation_period: Duration, mut context: watch::Receiver<CityContext>) -> Self {
        let (tx, rx) = watch::channel(FooterState::default());
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            // only content changes reach the rotation, not loading flags
            let (content_tx, content_rx) = watch::channel(context.borrow_and_update().daily_content.clone());
            let mut rotation = RotationTimer::start(rotation_period, content_rx.clone(), |c: &Option<DailyContentSet>| {
                c.as_ref().map_or(0, DailyContentSet::len)
            });
            let mut rotation_rx = rotation.subscribe();

            let mut ticker = Ticker {
                layout,
                marquee: MarqueeTiming::default(),
                scroll: AutoScroll::new(layout.timing),
                generation: 0,
                state: FooterState::default(),
                tx,
            };
            let initial = *rotation_rx.borrow_and_update();
            ticker.show(initial, &content_rx.borrow(), Instant::now());
            let mut context_open = true;

            loop {
                let deadline = ticker.next_deadline();
                tokio::select! {
                    changed = context.changed(), if context_open => {
                        if changed.is_err() {
                            context_open = false;
                            continue;
                        }
                        let next = context.borrow_and_update().daily_content.clone();
                        content_tx.send_if_modified(|current| {
                            if *current != next {
                                *current = next;
                                true
                            } else {
                                false
                            }
                        });
                    }
                    changed = rotation_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *rotation_rx.borrow_and_update();
                        ticker.show(state, &content_rx.borrow(), Instant::now());
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        ticker.step(Instant::now());
                    }
                    _ = stop_rx.recv() => {
                        info!("Footer ticker received stop signal. Exiting.");
                        break;
                    }
                }
            }
            rotation.stop().await;
        });

        Self { rx, stop_sender: Some(stop_tx), handle: Some(handle) }
    }

    pub fn subscribe(&self) -> watch::Receiver<FooterState> {
        self.rx.clone()
    }

    pub fn state(&self) -> FooterState {
        self.rx.borrow().clone()
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Footer ticker failed to join: {}", e));
        }
    }
}

impl Drop for FooterTicker {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
