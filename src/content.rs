/*
 *  content.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Daily devotional content shown in the footer
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

use serde::{Deserialize, Serialize};

/// Picture shown next to an item; unknown keys fall back to the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKey {
    Allah,
    Muhammad,
    Dua,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_key: Option<ImageKey>,
}

impl ContentItem {
    /// Image to show, `None` means render the title in its place.
    pub fn image(&self) -> Option<ImageKey> {
        self.image_key.filter(|k| *k != ImageKey::Unknown)
    }
}

/// The day's items, possibly empty. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyContentSet {
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

impl DailyContentSet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item under a rotation index, taken modulo the current length.
    pub fn get_wrapped(&self, index: usize) -> Option<&ContentItem> {
        if self.items.is_empty() {
            None
        } else {
            self.items.get(index % self.items.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items() {
        let json = r#"{"items":[
            {"title":"Ayet","text":"Verily, with hardship comes ease.","source":"94:6","imageKey":"allah"},
            {"title":"Dua","text":"Rabbi zidni ilma","imageKey":"lantern"},
            {"title":"Hadith","text":"The strong is the one who controls himself."}
        ]}"#;
        let set: DailyContentSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.items[0].image(), Some(ImageKey::Allah));
        assert_eq!(set.items[1].image_key, Some(ImageKey::Unknown));
        assert_eq!(set.items[1].image(), None);
        assert_eq!(set.items[2].source, None);
    }

    #[test]
    fn test_missing_items_is_empty() {
        let set: DailyContentSet = serde_json::from_str("{}").unwrap();
        assert!(set.is_empty());
        assert!(set.get_wrapped(3).is_none());
    }

    #[test]
    fn test_get_wrapped() {
        let item = |t: &str| ContentItem { title: t.into(), text: String::new(), source: None, image_key: None };
        let set = DailyContentSet { items: vec![item("a"), item("b")] };
        assert_eq!(set.get_wrapped(3).unwrap().title, "b");
    }
}
