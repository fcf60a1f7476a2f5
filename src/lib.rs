/*
 *  lib.rs
 *
 *  Vakitmatik - prayer times kiosk
 *  (c) 2020-26 Stuart Hunter
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

//! Scheduling and state layer of an always-on prayer times kiosk.

pub mod city;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod footer;
pub mod midnight;
pub mod navigation;
pub mod prayer;
pub mod render;
pub mod rotation;
pub mod scroll;
pub mod session;
pub mod sources;
pub mod visibility;
pub mod weather;
