//! Development tasks for clickpaste
//!
//! Usage:
//!   cargo xtask install [--service]  Install release binary to /usr/local/bin (requires sudo)
//!   cargo xtask uninstall            Remove binary and user service
//!   cargo xtask dist                 Build release binary for distribution

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const INSTALL_PATH: &str = "/usr/local/bin/clickpaste";

const SERVICE_UNIT: &str = r#"[Unit]
Description=ClickPaste - type the clipboard into a chosen window
PartOf=graphical-session.target
After=graphical-session.target

[Service]
ExecStart=/usr/local/bin/clickpaste daemon
Restart=on-failure

[Install]
WantedBy=graphical-session.target
"#;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    let service = args.iter().any(|a| a == "--service");

    let result = match args[0].as_str() {
        "install" => install(service),
        "uninstall" => uninstall(),
        "dist" => dist(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
clickpaste development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary and install to /usr/local/bin (requires sudo)
  uninstall  Remove clickpaste from /usr/local/bin and the user service
  dist       Build optimized release binary with man pages

Options:
  --service  Also install a systemd user service running the daemon

Examples:
  cargo xtask install             # Build and install the binary
  cargo xtask install --service   # ...and start the daemon with the session
  cargo xtask uninstall           # Remove installed binary
"#
    );
}

/// Get the project root directory
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };

    // xtask is in a subdirectory, go up one level
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

fn user_service_path() -> anyhow::Result<PathBuf> {
    let config_home = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(env::var("HOME")?).join(".config"),
    };
    Ok(config_home.join("systemd/user/clickpaste.service"))
}

fn cargo_build_release(root: &Path, man_pages: bool) -> anyhow::Result<PathBuf> {
    let mut cmd = Command::new("cargo");
    cmd.args(["build", "--release"]).current_dir(root);
    if man_pages {
        cmd.env("CLICKPASTE_GEN_MANPAGES", "1");
    }

    if !cmd.status()?.success() {
        anyhow::bail!("Build failed");
    }

    let binary = root.join("target/release/clickpaste");
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

/// Build release binary and install to /usr/local/bin
fn install(service: bool) -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building release binary...");
    let binary = cargo_build_release(&root, false)?;

    println!("==> Installing to {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .arg("install")
        .arg("-Dm755")
        .arg(&binary)
        .arg(INSTALL_PATH)
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed (sudo required)");
    }

    if service {
        let unit = user_service_path()?;
        if let Some(parent) = unit.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&unit, SERVICE_UNIT)?;
        println!("==> Wrote {:?}", unit);
        println!("    Enable with: systemctl --user enable --now clickpaste");
    }

    println!("==> Installed successfully!");
    println!();
    println!("Installed: {}", INSTALL_PATH);

    // Show version
    let _ = Command::new(INSTALL_PATH).arg("--version").status();

    Ok(())
}

/// Remove clickpaste from /usr/local/bin
fn uninstall() -> anyhow::Result<()> {
    println!("==> Removing {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .args(["rm", "-f", INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Uninstall failed (sudo required)");
    }

    let unit = user_service_path()?;
    if unit.exists() {
        let _ = Command::new("systemctl")
            .args(["--user", "disable", "--now", "clickpaste"])
            .status();
        std::fs::remove_file(&unit)?;
        println!("==> Removed {:?}", unit);
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary for distribution
fn dist() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building distribution binary (with man pages)...");
    let binary = cargo_build_release(&root, true)?;
    println!("==> Built: {:?}", binary);

    // Show binary info
    let _ = Command::new("ls").arg("-lh").arg(&binary).status();
    let _ = Command::new(&binary).arg("--version").status();

    Ok(())
}
