/*
 *  error.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types shared by the data sources and the refresh policies
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

use thiserror::Error;

/// Fixed message for a city key without configuration.
pub const INVALID_CITY: &str = "invalid city";

/// Fixed message for a city without a weather lookup name.
pub const NO_WEATHER_CITY: &str = "no city configured for weather";

/// Generic message when a load cycle dies unexpectedly.
pub const LOAD_FAILED: &str = "failed to load data";

/// Failure of a single fetch against one of the external sources.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Cancellation is not a failure and never reaches the error surface.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert!(!FetchError::Status(503).is_cancelled());
        assert!(!FetchError::Payload("empty".into()).is_cancelled());
    }

    #[test]
    fn test_messages() {
        assert_eq!(FetchError::Status(404).to_string(), "unexpected HTTP status 404");
        assert_eq!(FetchError::Cancelled.to_string(), "request cancelled");
    }
}
