// SPDX-License-Identifier: Apache-2.0

//! Input handling for the TUI

use crossterm::event::{self, Event, KeyCode};

use super::app::{App, Screen};
use crate::ApiClient;

pub async fn handle_input(app: &mut App, client: &ApiClient) -> bool {
    if !crossterm::event::poll(std::time::Duration::from_millis(250)).unwrap_or(false) {
        return false;
    }
    let Ok(Event::Key(key)) = event::read() else {
        return false;
    };

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.quit();
            return true;
        }
        KeyCode::Right | KeyCode::Char('n') => app.next_screen(),
        KeyCode::Left | KeyCode::Char('p') => app.previous_screen(),
        KeyCode::Down | KeyCode::Char('j') => app.next_item(),
        KeyCode::Up | KeyCode::Char('k') => app.previous_item(),
        KeyCode::Char('r') => app.clear_error(),

        KeyCode::Char('s') if app.current_screen == Screen::Streams => {
            if let Some(id) = app.selected_stream_id() {
                if let Err(err) = client.post(&format!("/streams/{id}/solo"), serde_json::json!({})).await {
                    app.set_error(err.to_string());
                }
            }
        }

        KeyCode::Char('x') if app.current_screen == Screen::Streams => {
            if let Err(err) = client.post("/solo/clear", serde_json::json!({})).await {
                app.set_error(err.to_string());
            }
        }

        KeyCode::Char('+') | KeyCode::Char('=') if app.current_screen == Screen::Streams => {
            adjust_gain(app, client, 1.0).await;
        }

        KeyCode::Char('-') if app.current_screen == Screen::Streams => {
            adjust_gain(app, client, -1.0).await;
        }

        KeyCode::Char('b') => {
            if let Err(err) = client.post("/balance-now", serde_json::json!({})).await {
                app.set_error(err.to_string());
            }
        }

        _ => {}
    }

    false
}

async fn adjust_gain(app: &mut App, client: &ApiClient, delta_db: f64) {
    let Some(id) = app.selected_stream_id() else {
        return;
    };
    let current = app
        .streams
        .as_ref()
        .and_then(|v| v["streams"].as_array())
        .and_then(|a| a.get(app.selected_index))
        .and_then(|s| s["gain_db"].as_f64())
        .unwrap_or(0.0);

    let body = serde_json::json!({ "gain_db": current + delta_db });
    if let Err(err) = client.post(&format!("/streams/{id}/gain"), body).await {
        app.set_error(err.to_string());
    }
}
