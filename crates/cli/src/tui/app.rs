// SPDX-License-Identifier: Apache-2.0

//! Application state for the TUI

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Dashboard,
    Streams,
    Limiter,
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub current_screen: Screen,
    pub base_url: String,
    pub streams: Option<Value>,
    pub limiter: Option<Value>,
    pub auto_balance: Option<Value>,
    pub error_message: Option<String>,
    pub selected_index: usize,
}

impl App {
    pub fn new(base_url: String) -> Self {
        Self {
            running: true,
            current_screen: Screen::Dashboard,
            base_url,
            streams: None,
            limiter: None,
            auto_balance: None,
            error_message: None,
            selected_index: 0,
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn next_screen(&mut self) {
        self.current_screen = match self.current_screen {
            Screen::Dashboard => Screen::Streams,
            Screen::Streams => Screen::Limiter,
            Screen::Limiter => Screen::Dashboard,
        };
    }

    pub fn previous_screen(&mut self) {
        self.current_screen = match self.current_screen {
            Screen::Dashboard => Screen::Limiter,
            Screen::Streams => Screen::Dashboard,
            Screen::Limiter => Screen::Streams,
        };
    }

    pub fn stream_count(&self) -> usize {
        self.streams
            .as_ref()
            .and_then(|v| v["streams"].as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }

    pub fn next_item(&mut self) {
        let count = self.stream_count();
        if count > 0 {
            self.selected_index = (self.selected_index + 1) % count;
        }
    }

    pub fn previous_item(&mut self) {
        let count = self.stream_count();
        if count > 0 {
            self.selected_index = (self.selected_index + count - 1) % count;
        }
    }

    pub fn selected_stream_id(&self) -> Option<String> {
        self.streams
            .as_ref()
            .and_then(|v| v["streams"].as_array())
            .and_then(|a| a.get(self.selected_index))
            .and_then(|s| s["id"].as_str())
            .map(|s| s.to_string())
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn set_error(&mut self, error: String) {
        self.error_message = Some(error);
    }
}
