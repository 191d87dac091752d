use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap_complete::{generate, Shell};

use crate::app::AppError;

const BIN_NAME: &str = "slotree";

pub fn generate_completions(shell: Shell, buf: &mut dyn Write) {
    let mut cmd = crate::cli::styled_command();
    generate(shell, &mut cmd, BIN_NAME, buf);
}

fn shell_from_name(raw: &str) -> Option<Shell> {
    let name = raw.trim().rsplit('/').next()?.to_ascii_lowercase();
    match name.as_str() {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "powershell" | "pwsh" => Some(Shell::PowerShell),
        _ => None,
    }
}

pub fn detect_current_shell() -> Option<Shell> {
    shell_from_name(&std::env::var("SHELL").ok()?)
}

/// Per-user completion file location. Zsh has no standard user directory,
/// so the file lands next to the other shells' and the caller sources it.
fn install_path(shell: Shell, home: &Path) -> Option<PathBuf> {
    match shell {
        Shell::Bash => Some(home.join(".local/share/bash-completion/completions").join(BIN_NAME)),
        Shell::Zsh => Some(home.join(".config/slotree/completions/_slotree")),
        Shell::Fish => Some(home.join(".config/fish/completions/slotree.fish")),
        _ => None,
    }
}

pub fn install_completions(shell: Shell, home: &Path) -> io::Result<PathBuf> {
    let path = install_path(shell, home).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no install location for {shell:?} completions"),
        )
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut buf = Vec::new();
    generate_completions(shell, &mut buf);
    std::fs::write(&path, buf)?;
    Ok(path)
}

pub fn run_completions_command(shell_arg: Option<&str>, install: bool) -> Result<(), AppError> {
    let shell = match shell_arg {
        Some(name) => shell_from_name(name)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown shell '{name}'")))?,
        None => detect_current_shell().ok_or_else(|| {
            AppError::InvalidArgument(
                "unable to detect shell from $SHELL; pass a shell name".to_string(),
            )
        })?,
    };

    if install {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| AppError::InvalidArgument("HOME is not set".to_string()))?;
        let path = install_completions(shell, &home)?;
        println!("completions installed to {}", path.display());
        if shell == Shell::Zsh {
            println!("add `source \"{}\"` to your .zshrc", path.display());
        }
    } else {
        let mut stdout = io::stdout().lock();
        generate_completions(shell, &mut stdout);
    }
    Ok(())
}
