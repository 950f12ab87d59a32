// SPDX-License-Identifier: Apache-2.0

//! Loudness Balancer CLI - command-line and TUI client for the daemon's
//! REST surface. A thin HTTP client; all measurement and
//! balancing logic lives in `loudness-core`/`loudness-daemon`.

mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "loudness-cli")]
#[command(about = "Loudness Balancer command-line interface", long_about = None)]
#[command(version)]
struct Args {
    /// Daemon API URL
    #[arg(short, long, default_value = "http://127.0.0.1:7878")]
    daemon: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show daemon status
    Status,

    /// Interactive terminal UI dashboard
    Tui,

    /// Stream management
    #[command(subcommand)]
    Stream(StreamCommands),

    /// Auto-balance configuration
    #[command(subcommand)]
    AutoBalance(AutoBalanceCommands),

    /// Run a one-shot balancing pass
    BalanceNow {
        /// Target loudness in LUFS; defaults to the configured auto-balance target
        #[arg(long)]
        target_lufs: Option<f64>,
    },

    /// Limiter configuration
    #[command(subcommand)]
    Limiter(LimiterCommands),
}

#[derive(Subcommand, Debug)]
enum StreamCommands {
    /// List all registered streams
    List,

    /// Register a new stream against a synthetic source (for demo/testing)
    Register {
        /// Human-readable label
        label: String,

        /// Synthetic source kind: silence, sine, or unavailable
        #[arg(long, default_value = "silence")]
        kind: String,

        /// Sine frequency in Hz (only used when kind = sine)
        #[arg(long, default_value_t = 1000.0)]
        frequency_hz: f64,

        /// Sine amplitude, 0..1 (only used when kind = sine)
        #[arg(long, default_value_t = 0.1)]
        amplitude: f64,
    },

    /// Unregister a stream
    Remove {
        id: Uuid,
    },

    /// Set a stream's gain
    Gain {
        id: Uuid,
        gain_db: f64,
    },

    /// Set a stream's maximum gain ceiling
    MaxGain {
        id: Uuid,
        max_gain_db: f64,
    },

    /// Reset a stream's loudness measurements
    Reset {
        id: Uuid,
    },

    /// Toggle solo on a stream
    Solo {
        id: Uuid,
    },

    /// Clear solo, restoring every stream's stored gain
    ClearSolo,
}

#[derive(Subcommand, Debug)]
enum AutoBalanceCommands {
    /// Show current auto-balance settings
    Get,

    /// Update auto-balance settings
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        target_lufs: Option<f64>,
    },
}

#[derive(Subcommand, Debug)]
enum LimiterCommands {
    /// Show current limiter settings
    Get,

    /// Update limiter settings (only the given fields change)
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        threshold_db: Option<f64>,
        #[arg(long)]
        knee_db: Option<f64>,
        #[arg(long)]
        ratio: Option<f64>,
        #[arg(long)]
        attack_ms: Option<f64>,
        #[arg(long)]
        release_ms: Option<f64>,
    },
}

pub(crate) struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub(crate) async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let response = self.client.get(&url).send().await.context("failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("request failed with status: {}", response.status());
        }

        response.json().await.context("failed to parse JSON")
    }

    pub(crate) async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("request failed with status: {}", response.status());
        }

        response.json().await.context("failed to parse JSON")
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let response = self.client.delete(&url).send().await.context("failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("request failed with status: {}", response.status());
        }

        Ok(())
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = ApiClient::new(args.daemon.clone());

    match args.command {
        Commands::Tui => {
            run_tui(args.daemon).await?;
        }

        Commands::Status => {
            print_json(&client.get("/status").await?)?;
        }

        Commands::Stream(cmd) => match cmd {
            StreamCommands::List => {
                print_json(&client.get("/streams").await?)?;
            }

            StreamCommands::Register {
                label,
                kind,
                frequency_hz,
                amplitude,
            } => {
                let source_handle = match kind.as_str() {
                    "silence" => serde_json::json!({ "kind": "silence" }),
                    "sine" => serde_json::json!({
                        "kind": "sine_wave",
                        "frequency_hz": frequency_hz,
                        "amplitude": amplitude,
                    }),
                    "unavailable" => serde_json::json!({ "kind": "unavailable" }),
                    other => anyhow::bail!("unknown source kind: {other}"),
                };
                let body = serde_json::json!({ "label": label, "source_handle": source_handle });
                print_json(&client.post("/streams", body).await?)?;
            }

            StreamCommands::Remove { id } => {
                client.delete(&format!("/streams/{id}")).await?;
                println!("stream {id} removed");
            }

            StreamCommands::Gain { id, gain_db } => {
                let body = serde_json::json!({ "gain_db": gain_db });
                print_json(&client.post(&format!("/streams/{id}/gain"), body).await?)?;
            }

            StreamCommands::MaxGain { id, max_gain_db } => {
                let body = serde_json::json!({ "max_gain_db": max_gain_db });
                print_json(&client.post(&format!("/streams/{id}/max-gain"), body).await?)?;
            }

            StreamCommands::Reset { id } => {
                client.post(&format!("/streams/{id}/reset"), serde_json::json!({})).await?;
                println!("stream {id} measurements reset");
            }

            StreamCommands::Solo { id } => {
                print_json(&client.post(&format!("/streams/{id}/solo"), serde_json::json!({})).await?)?;
            }

            StreamCommands::ClearSolo => {
                print_json(&client.post("/solo/clear", serde_json::json!({})).await?)?;
            }
        },

        Commands::AutoBalance(cmd) => match cmd {
            AutoBalanceCommands::Get => {
                print_json(&client.get("/auto-balance").await?)?;
            }
            AutoBalanceCommands::Set { enabled, target_lufs } => {
                let body = serde_json::json!({ "enabled": enabled, "target_lufs": target_lufs });
                print_json(&client.post("/auto-balance", body).await?)?;
            }
        },

        Commands::BalanceNow { target_lufs } => {
            let body = serde_json::json!({ "target_lufs": target_lufs });
            client.post("/balance-now", body).await?;
            println!("balancing pass complete");
        }

        Commands::Limiter(cmd) => match cmd {
            LimiterCommands::Get => {
                print_json(&client.get("/limiter").await?)?;
            }
            LimiterCommands::Set {
                enabled,
                threshold_db,
                knee_db,
                ratio,
                attack_ms,
                release_ms,
            } => {
                let body = serde_json::json!({
                    "enabled": enabled,
                    "threshold_db": threshold_db,
                    "knee_db": knee_db,
                    "ratio": ratio,
                    "attack_ms": attack_ms,
                    "release_ms": release_ms,
                });
                print_json(&client.post("/limiter", body).await?)?;
            }
        },
    }

    Ok(())
}

async fn run_tui(base_url: String) -> Result<()> {
    use crossterm::{
        execute,
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    };
    use ratatui::prelude::*;

    let mut stdout = std::io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let client = ApiClient::new(base_url.clone());
    let mut app = tui::App::new(base_url);

    let result = loop {
        if let Ok(streams) = client.get("/streams").await {
            app.streams = Some(streams);
        }
        if let Ok(limiter) = client.get("/limiter").await {
            app.limiter = Some(limiter);
        }

        terminal.draw(|f| {
            tui::ui::draw(f, &app);
        })?;

        if tui::handler::handle_input(&mut app, &client).await {
            break Ok::<(), anyhow::Error>(());
        }

        if !app.running {
            break Ok(());
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
