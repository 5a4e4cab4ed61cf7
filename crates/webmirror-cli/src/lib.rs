// Copyright 2026 Webmirror Contributors
// SPDX-License-Identifier: MIT

//! Command-line runner for webmirror.

pub mod config;
pub mod output;
