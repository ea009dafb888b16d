//! ClickPaste - click a window, type your clipboard into it
//!
//! Run with `clickpaste` or `clickpaste daemon` to start the daemon.
//! Use `clickpaste paste` for a one-shot paste without a daemon.
//! Use `clickpaste check` to verify the backend and helper tools.

use clap::Parser;
use clickpaste::cli::{Cli, Commands};
use clickpaste::config::{self, BackendKind, Config};
use clickpaste::control::{self, ControlRequest};
use clickpaste::dispatch::{DispatchEvent, Dispatcher, PasteOutcome};
use clickpaste::status::{self, StatusFormat};
use clickpaste::{backend, capture, clipboard, confirm, daemon, hotkey, notification};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("clickpaste={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref backend) = cli.backend {
        config.paste.backend = backend
            .parse::<BackendKind>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(delay) = cli.delay {
        config.paste.delay_ms = delay;
        config.paste.profile = None;
    }
    if let Some(profile) = cli.profile {
        config.paste.profile = Some(profile);
    }
    if let Some(threshold) = cli.threshold {
        config.paste.confirm_threshold = threshold;
    }

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Paste { text, stdin, yes } => {
            run_paste(&config, text, stdin, yes).await?;
        }

        Commands::Trigger => {
            let pid = control::send(&Config::pid_file(), ControlRequest::Trigger)?;
            tracing::debug!("Triggered paste in daemon {}", pid);
        }

        Commands::Cancel => {
            let pid = control::send(&Config::pid_file(), ControlRequest::Cancel)?;
            tracing::debug!("Sent cancel to daemon {}", pid);
        }

        Commands::Status { follow, format } => {
            let format: StatusFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            run_status(&config, follow, format)?;
        }

        Commands::Check => {
            run_check(&config).await?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Init { force } => {
            let path = cli
                .config
                .or_else(Config::default_path)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine the config directory"))?;
            config::write_default_config(&path, force)?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}

/// One-shot paste: capture, confirm, type, report, exit
async fn run_paste(
    config: &Config,
    text: Option<String>,
    from_stdin: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let text = match text {
        Some(text) => text,
        None if from_stdin => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        None => clipboard::read_clipboard_text().await?,
    };

    let mut options = config.paste_options()?;
    if yes {
        options.confirm_threshold = usize::MAX;
    }

    let (dispatcher, mut events) = Dispatcher::new(
        backend::create_backend(config),
        capture::CaptureController::desktop(),
        options,
    );

    let handle = dispatcher.start_paste(text)?;
    eprintln!("Click the target window (ESC to cancel)...");

    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,

            Some(event) = events.recv() => {
                match event {
                    DispatchEvent::ConfirmationRequired { chars } => {
                        let dispatcher = dispatcher.clone();
                        let closed = dispatcher.confirmation_closed();
                        tokio::spawn(async move {
                            if let Some(accept) = confirm::ask(chars, closed).await {
                                dispatcher.confirm(accept);
                            }
                        });
                    }
                    DispatchEvent::Progress { sent, total } => {
                        tracing::trace!("Typed {}/{}", sent, total);
                    }
                    _ => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, cancelling paste...");
                dispatcher.cancel();
            }
        }
    };

    let (title, body, _) = notification::describe_outcome(&outcome);
    match outcome {
        PasteOutcome::Failed { .. } => anyhow::bail!("{}: {}", title, body),
        _ => println!("{}: {}", title, body),
    }

    Ok(())
}

fn run_status(config: &Config, follow: bool, format: StatusFormat) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        eprintln!();
        eprintln!("This enables external integrations like Waybar to monitor clickpaste state.");
        std::process::exit(1);
    };

    if follow {
        status::follow(&state_path, format)?;
    } else {
        println!("{}", status::render(&status::read_state(&state_path), format));
    }

    Ok(())
}

/// Check the backend and helper tools
async fn run_check(config: &Config) -> anyhow::Result<()> {
    println!("ClickPaste Check\n");
    println!("================\n");

    let mut all_ok = true;

    println!("Session:");
    match std::env::var("DISPLAY") {
        Ok(display) => println!("  ✓ DISPLAY={}", display),
        Err(_) => {
            println!("  ! DISPLAY is not set (capture reads /dev/input, no crosshair)");
            if std::fs::read_dir("/dev/input").is_err() {
                println!("    ✗ /dev/input is not readable; add yourself to the 'input' group");
                all_ok = false;
            }
        }
    }
    if let Ok(wayland) = std::env::var("WAYLAND_DISPLAY") {
        println!("  ✓ WAYLAND_DISPLAY={}", wayland);
    }

    println!("\nInjection backend ({})...", config.paste.backend);
    let mut injector = backend::create_backend(config);
    match injector.prepare().await {
        Ok(()) => {
            println!("  ✓ {} ready", injector.name());
            if !injector.supports_unicode() {
                println!("  ! {} types US-layout characters only", injector.name());
            }
        }
        Err(e) => {
            println!("  ✗ {}", e);
            all_ok = false;
        }
    }

    println!("\nClipboard tools...");
    let clipboard_tools: Vec<&str> = ["wl-paste", "xclip"]
        .into_iter()
        .filter(|tool| which::which(tool).is_ok())
        .collect();
    if clipboard_tools.is_empty() {
        println!("  ✗ Neither wl-paste nor xclip found");
        println!("    Install wl-clipboard (Wayland) or xclip (X11)");
        all_ok = false;
    } else {
        for tool in clipboard_tools {
            println!("  ✓ {} found", tool);
        }
    }

    println!("\nHelpers...");
    if which::which("zenity").is_ok() {
        println!("  ✓ zenity found (confirmation dialog)");
    } else {
        println!(
            "  ✗ zenity not found, pastes over {} characters will be declined",
            config.paste.confirm_threshold
        );
    }
    if which::which("notify-send").is_ok() {
        println!("  ✓ notify-send found (notifications)");
    } else if config.notification.enabled {
        println!("  ✗ notify-send not found, notifications disabled");
    }

    if config.hotkey.enabled {
        println!("\nHotkey...");
        match hotkey::create_listener(&config.hotkey) {
            Ok(_) => println!(
                "  ✓ {}+{} readable from /dev/input",
                config.hotkey.modifiers.join("+"),
                config.hotkey.key
            ),
            Err(e) => {
                println!("  ✗ {}", e);
                all_ok = false;
            }
        }
    }

    println!("\nDaemon...");
    match control::read_pid(&Config::pid_file()) {
        Ok(pid) => println!("  ✓ running (pid {})", pid),
        Err(_) => println!("  - not running (start with: clickpaste daemon)"),
    }

    println!();
    if all_ok {
        println!("All checks passed.");
        Ok(())
    } else {
        anyhow::bail!("Some checks failed, see above")
    }
}

/// Show current configuration
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("{}", toml::to_string_pretty(config)?);

    println!("---");
    println!("Effective delay: {} ms", config.effective_delay_ms()?);
    if let Some(resolved) = config.resolve_state_file() {
        println!("State file: {:?}", resolved);
    }
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!("PID file: {:?}", Config::pid_file());

    Ok(())
}
