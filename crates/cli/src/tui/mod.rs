// SPDX-License-Identifier: Apache-2.0

//! Terminal User Interface (TUI) module using Ratatui

pub mod app;
pub mod handler;
pub mod ui;

pub use app::App;
