/*
 *  scroll.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Vertical auto-scroll for the footer panel
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

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How the footer moves overflowing content.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMode {
    /// pause, step a few pixels per tick, pause, jump back
    #[default]
    Step,
    /// one continuous hold / glide / hold animation per cycle
    Marquee,
}

/// Timing of the stepping cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTiming {
    pub pause: Duration,
    pub step_interval: Duration,
    pub step_px: u32,
}

impl Default for ScrollTiming {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(1),
            step_interval: Duration::from_millis(30),
            step_px: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    /// content fits, nothing scheduled
    Static,
    PausingTop { until: Instant },
    Scrolling { next_step: Instant },
    PausingBottom { until: Instant },
}

// catching up after a long stall is cheaper as a fresh cycle
const MAX_CATCH_UP_STEPS: u32 = 10_000;

/// Pause -> scroll -> pause -> reset loop over one measured item.
///
/// Pure state machine: the owner calls [`AutoScroll::poll`] with the current
/// instant and sleeps until [`AutoScroll::next_deadline`]. There are no
/// timers to leak, dropping the value ends the cycle.
#[derive(Debug, Clone)]
pub struct AutoScroll {
    timing: ScrollTiming,
    viewport: u32,
    content: u32,
    offset: u32,
    phase: ScrollPhase,
}

impl AutoScroll {
    pub fn new(timing: ScrollTiming) -> Self {
        Self {
            timing,
            viewport: 0,
            content: 0,
            offset: 0,
            phase: ScrollPhase::Static,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn phase(&self) -> ScrollPhase {
        self.phase
    }

    pub fn can_scroll(&self) -> bool {
        self.content > self.viewport
    }

    pub fn max_offset(&self) -> u32 {
        self.content.saturating_sub(self.viewport)
    }

    /// Feed new measurements. Any size change restarts the cycle; identical
    /// sizes leave a running cycle alone. Returns true when restarted.
    pub fn measure(&mut self, viewport: u32, content: u32, now: Instant) -> bool {
        if viewport == self.viewport && content == self.content {
            return false;
        }
        self.viewport = viewport;
        self.content = content;
        self.reset(now);
        true
    }

    /// Drop whatever is scheduled and start over from the top. Called when the
    /// shown item changes even if it measures the same.
    pub fn reset(&mut self, now: Instant) {
        self.offset = 0;
        self.phase = if self.can_scroll() {
            ScrollPhase::PausingTop { until: now + self.timing.pause }
        } else {
            ScrollPhase::Static
        };
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            ScrollPhase::Static => None,
            ScrollPhase::PausingTop { until } => Some(until),
            ScrollPhase::Scrolling { next_step } => Some(next_step),
            ScrollPhase::PausingBottom { until } => Some(until),
        }
    }

    /// Run every deadline that is due at `now`, returns the resulting offset.
    pub fn poll(&mut self, now: Instant) -> u32 {
        let mut steps = 0;
        while let Some(due) = self.next_deadline() {
            if due > now {
                break;
            }
            steps += 1;
            if steps > MAX_CATCH_UP_STEPS {
                self.reset(now);
                break;
            }
            self.fire(due);
        }
        self.offset
    }

    fn fire(&mut self, due: Instant) {
        let max = self.max_offset();
        self.phase = match self.phase {
            ScrollPhase::Static => ScrollPhase::Static,
            ScrollPhase::PausingTop { .. } => {
                ScrollPhase::Scrolling { next_step: due + self.timing.step_interval }
            }
            ScrollPhase::Scrolling { .. } => {
                self.offset = (self.offset + self.timing.step_px).min(max);
                if self.offset >= max {
                    ScrollPhase::PausingBottom { until: due + self.timing.pause }
                } else {
                    ScrollPhase::Scrolling { next_step: due + self.timing.step_interval }
                }
            }
            ScrollPhase::PausingBottom { .. } => {
                self.offset = 0;
                ScrollPhase::PausingTop { until: due + self.timing.pause }
            }
        };
    }
}

/// Parameters of the continuous marquee.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarqueeTiming {
    pub speed_px_per_sec: f64,
    /// share of the cycle held still at the top, and again at the bottom
    pub pause_fraction: f64,
    pub min_duration: Duration,
    /// distances below this do not scroll at all
    pub threshold_px: u32,
}

impl Default for MarqueeTiming {
    fn default() -> Self {
        Self {
            speed_px_per_sec: 40.0,
            pause_fraction: 0.1,
            min_duration: Duration::from_secs(8),
            threshold_px: 30,
        }
    }
}

/// One computed marquee animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarqueePlan {
    pub distance: u32,
    pub duration: Duration,
    pub pause_fraction: f64,
    /// bumps on every re-measure, restarts the animation
    pub generation: u64,
    pub started: Instant,
}

impl MarqueePlan {
    /// `None` when the content fits or overflows by less than the threshold.
    pub fn compute(
        timing: &MarqueeTiming,
        viewport: u32,
        content: u32,
        generation: u64,
        started: Instant,
    ) -> Option<Self> {
        let distance = content.saturating_sub(viewport);
        if distance < timing.threshold_px.max(1) {
            return None;
        }
        let frac = timing.pause_fraction.clamp(0.0, 0.45);
        let base = f64::from(distance) / timing.speed_px_per_sec.max(f64::EPSILON);
        let inflated = base / (1.0 - 2.0 * frac);
        let duration = Duration::from_secs_f64(inflated).max(timing.min_duration);
        Some(Self { distance, duration, pause_fraction: frac, generation, started })
    }

    /// Offset along the hold / glide / hold profile, repeating forever.
    pub fn offset_at(&self, now: Instant) -> u32 {
        let total = self.duration.as_secs_f64();
        if total <= 0.0 {
            return 0;
        }
        let t = now.saturating_duration_since(self.started).as_secs_f64() % total;
        let hold = total * self.pause_fraction;
        if t <= hold {
            0
        } else if t >= total - hold {
            self.distance
        } else {
            let progress = (t - hold) / (total - 2.0 * hold);
            (f64::from(self.distance) * progress).round() as u32
        }
    }
}
