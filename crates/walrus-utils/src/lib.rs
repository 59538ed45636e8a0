// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Shared utilities for the Walrus client crates.

pub mod backoff;
pub mod config;
