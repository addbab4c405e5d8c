// SPDX-License-Identifier: GPL-3.0-or-later

//! `resonance`: content-addressed music library organizer. Library half of
//! the crate — `main.rs` is a thin entry point over the modules here.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod providers;
