// Command-line interface definitions for clickpaste
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clickpaste")]
#[command(author, version, about = "Click a window, type your clipboard into it")]
#[command(long_about = "
ClickPaste types the clipboard into a window of your choice, one keystroke
at a time. It is meant for places where paste does not work: VNC viewers,
remote consoles, virtual machine displays.

SETUP:
  1. Pick a backend (paste.backend in the config):
     native - X11/XWayland via XTest, nothing else to install
     cli    - xdotool (X11) or wtype (Wayland)
     daemon - ydotoold: systemctl --user enable --now ydotool
  2. Install wl-clipboard (Wayland) or xclip (X11) for clipboard access
  3. Run: clickpaste check
  4. Run: clickpaste (to start the daemon)
  5. Bind `clickpaste trigger` to a key in your desktop, or enable [hotkey]

USAGE:
  Trigger a paste, click the target window, watch it type.
  ESC before clicking cancels; `clickpaste cancel` or the cancel key stops
  typing at the next keystroke.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override injection backend (native, cli, daemon)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Override delay between keystrokes in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay: Option<u32>,

    /// Use a named delay profile (default, vnc, slow_vnc, very_slow, ...)
    #[arg(long, value_name = "NAME", conflicts_with = "delay")]
    pub profile: Option<String>,

    /// Override the confirmation threshold in characters
    #[arg(long, value_name = "CHARS")]
    pub threshold: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Paste once without a daemon: click a target, type, exit
    Paste {
        /// Type this text instead of the clipboard
        #[arg(long, value_name = "TEXT", conflicts_with = "stdin")]
        text: Option<String>,

        /// Read the text from standard input
        #[arg(long)]
        stdin: bool,

        /// Skip the confirmation prompt for long texts
        #[arg(short, long)]
        yes: bool,
    },

    /// Start a paste in the running daemon (send SIGUSR1)
    Trigger,

    /// Cancel the running daemon's paste (send SIGUSR2)
    Cancel,

    /// Show daemon status (for Waybar/polybar integration)
    Status {
        /// Continuously output status changes (for Waybar exec)
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json" (for Waybar)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check that the configured backend and helper tools are available
    Check,

    /// Show current configuration
    Config,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
