/*
 *  navigation.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Page selection from a city path
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

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// go to this city key instead
    Redirect(String),
    /// a single path segment, valid or not
    City(String),
    /// instructional page listing the valid paths
    Fallback,
}

/// Map a path such as "/", "/hannover" or "#/braunschweig" onto a route.
/// A bare key without slash is accepted as a city.
pub fn resolve_route(path: &str, default_city: &str) -> Route {
    let path = path.trim();
    let path = path.strip_prefix('#').unwrap_or(path);
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Route::Redirect(default_city.to_string());
    }
    if trimmed.contains('/') {
        return Route::Fallback;
    }
    Route::City(trimmed.to_string())
}

/// Follow redirects until a page is reached.
pub fn resolve_page(path: &str, default_city: &str) -> Route {
    match resolve_route(path, default_city) {
        Route::Redirect(key) => Route::City(key),
        other => other,
    }
}

pub fn is_valid_city(cfg: &Config, key: &str) -> bool {
    cfg.city(key).is_some()
}

/// Text of the fallback page.
pub fn fallback_text(cfg: &Config) -> String {
    let mut out = String::from("Bitte Stadt-URL aufrufen, z. B.\n");
    for key in cfg.cities().keys() {
        out.push_str(&format!("  /{key}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CITY;

    #[test]
    fn test_root_redirects() {
        assert_eq!(resolve_route("", DEFAULT_CITY), Route::Redirect("hannover".into()));
        assert_eq!(resolve_route("/", DEFAULT_CITY), Route::Redirect("hannover".into()));
        assert_eq!(resolve_route("#/", DEFAULT_CITY), Route::Redirect("hannover".into()));
        assert_eq!(resolve_page("/", DEFAULT_CITY), Route::City("hannover".into()));
    }

    #[test]
    fn test_single_segment_is_city() {
        assert_eq!(resolve_route("/braunschweig", DEFAULT_CITY), Route::City("braunschweig".into()));
        assert_eq!(resolve_route("/braunschweig/", DEFAULT_CITY), Route::City("braunschweig".into()));
        assert_eq!(resolve_route("berlin", DEFAULT_CITY), Route::City("berlin".into()));
    }

    #[test]
    fn test_deeper_paths_fall_back() {
        assert_eq!(resolve_route("/a/b", DEFAULT_CITY), Route::Fallback);
    }

    #[test]
    fn test_validity_and_fallback_listing() {
        let cfg = Config::default();
        assert!(is_valid_city(&cfg, "hannover"));
        assert!(!is_valid_city(&cfg, "berlin"));
        let text = fallback_text(&cfg);
        assert!(text.contains("/hannover"));
        assert!(text.contains("/braunschweig"));
    }
}
