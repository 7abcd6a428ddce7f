mod gemini;
mod hotkey;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use global_hotkey::GlobalHotKeyEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gemini::{GeminiClient, GeminiError};
use hotkey::{HotkeyManager, OsBackend};
use settings::SettingsStore;

#[derive(Parser)]
#[command(name = "july")]
#[command(about = "July - answer a global hotkey with a Gemini completion")]
struct Cli {
    /// Runs the hotkey agent when no subcommand is given
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt and print the completion
    Ask {
        /// The request text
        text: String,
        /// Model to use (defaults to the stored model)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Store the Gemini API key
    SetKey { key: String },
    /// Show stored settings, or change them via flags
    Config {
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        hotkey: Option<String>,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        auto_start: Option<bool>,
    },
    /// List the supported model identifiers
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let store = SettingsStore::new();

    match cli.command {
        None => run_agent(store).await,
        Some(Command::Ask { text, model }) => ask(store, &text, model).await,
        Some(Command::SetKey { key }) => set_key(&store, &key),
        Some(Command::Config {
            model,
            hotkey,
            theme,
            prompt,
            auto_start,
        }) => config(&store, model, hotkey, theme, prompt, auto_start),
        Some(Command::Models) => {
            for model in gemini::available_models() {
                println!("{model}");
            }
            Ok(())
        }
    }
}

/// Agent mode: register the stored hotkey and answer every press until
/// Ctrl-C. The completion call runs in its own task so the event pump stays
/// responsive; overlapping presses produce independent requests.
async fn run_agent(store: SettingsStore) -> Result<()> {
    let client = GeminiClient::new(store.clone()).context("failed to build HTTP client")?;

    let backend = OsBackend::new()?;
    let (mut hotkeys, mut fired) = HotkeyManager::new(backend);

    let binding = store.hotkey();
    if let Err(e) = hotkeys.register(&binding) {
        // Non-fatal: the agent keeps running, just without a hotkey this
        // session.
        warn!(%binding, "hotkey not registered: {e}");
    }
    if let Some(active) = hotkeys.current() {
        println!("Listening for {} (Ctrl-C to quit)", active.text());
    }

    // Forward raw OS hotkey events onto the async loop. The crate hands
    // events out on a blocking channel, so the pump gets its own thread.
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let receiver = GlobalHotKeyEvent::receiver();
        while let Ok(event) = receiver.recv() {
            if raw_tx.send(event).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = raw_rx.recv() => {
                // Pass-through filter: every event goes through the manager,
                // matches come back on the fired channel.
                hotkeys.process_event(&event);
            }
            Some(()) = fired.recv() => {
                let client = client.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(e) = answer_once(&client, &store).await {
                        error!("completion failed: {e}");
                    }
                });
            }
        }
    }

    // Release the OS binding before exit; in-flight requests are dropped.
    if hotkeys.is_registered() {
        if let Err(e) = hotkeys.unregister() {
            warn!("failed to unregister hotkey on exit: {e}");
        }
    }
    info!("shutting down");
    Ok(())
}

/// One hotkey press: read a line of request text and print the answer.
async fn answer_once(client: &GeminiClient, store: &SettingsStore) -> Result<()> {
    println!("Request:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read request text")?;
    let text = line.trim();
    if text.is_empty() {
        return Ok(());
    }

    let model = store.model();
    match client.generate(text, &model).await {
        Ok(answer) => {
            println!("\n{answer}\n");
            Ok(())
        }
        Err(GeminiError::MissingApiKey) => {
            println!("{}", missing_key_help());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn ask(store: SettingsStore, text: &str, model: Option<String>) -> Result<()> {
    let client = GeminiClient::new(store.clone()).context("failed to build HTTP client")?;
    let model = model.unwrap_or_else(|| store.model());

    match client.generate(text, &model).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(GeminiError::MissingApiKey) => anyhow::bail!(missing_key_help()),
        Err(e) => Err(e).context("completion request failed"),
    }
}

fn set_key(store: &SettingsStore, key: &str) -> Result<()> {
    if !gemini::is_valid_api_key(key) {
        anyhow::bail!("that does not look like a Gemini API key (too short)");
    }
    store.update_api_key(key)?;
    println!("API key saved to {}", store.path().display());
    Ok(())
}

fn config(
    store: &SettingsStore,
    model: Option<String>,
    hotkey: Option<String>,
    theme: Option<String>,
    prompt: Option<String>,
    auto_start: Option<bool>,
) -> Result<()> {
    let mut changed = false;

    if let Some(model) = model {
        store.update_model(&model)?;
        changed = true;
    }
    if let Some(binding) = hotkey {
        // Validate before persisting so the agent never loads an
        // unregistrable binding.
        hotkey::Binding::parse(&binding)?;
        store.update_hotkey(&binding)?;
        changed = true;
    }
    if let Some(theme) = theme {
        store.update_theme(&theme)?;
        changed = true;
    }
    if let Some(prompt) = prompt {
        store.update_prompt(&prompt)?;
        changed = true;
    }
    if let Some(auto_start) = auto_start {
        store.update_auto_start(auto_start)?;
        changed = true;
    }

    if changed {
        return Ok(());
    }

    println!(
        "settings file: {}{}",
        store.path().display(),
        if store.exists() { "" } else { " (not created yet)" }
    );
    println!(
        "apiKey:    {}",
        if store.api_key().is_some() { "(set)" } else { "(not set)" }
    );
    println!("model:     {}", store.model());
    println!("theme:     {}", store.theme());
    println!("hotkey:    {}", store.hotkey());
    println!("autoStart: {}", store.auto_start());
    println!("prompt:    {}", store.prompt());
    Ok(())
}

fn missing_key_help() -> String {
    "No API key configured. Get one from Google AI Studio and run: july set-key <KEY>".to_string()
}
