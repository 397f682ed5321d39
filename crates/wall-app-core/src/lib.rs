// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for CaveWall processes (config, prefs).
//! Keeps the master/worker binaries thin and storage-agnostic.

pub mod config;
pub mod prefs;
