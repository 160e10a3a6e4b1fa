// SPDX-License-Identifier: MPL-2.0-only

//! Config for fullscreen-isolator

mod isolator_config;

pub use isolator_config::*;
