//! Shell completion generation and installation.

use {
    crate::{Cli, CliError},
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    directories::BaseDirs,
    std::{
        env, fs, io,
        path::{Path, PathBuf},
    },
};

/// Write the completion script for `shell` into `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Map a shell binary path to its `Shell`.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where the completion script for `shell` is installed.
fn install_path(dirs: &BaseDirs, shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs
            .data_dir()
            .join("bash-completion/completions/ezflash"),
        Shell::Zsh => dirs.home_dir().join(".zfunc/_ezflash"),
        Shell::Fish => dirs.config_dir().join("fish/completions/ezflash.fish"),
        Shell::Elvish => dirs.config_dir().join("elvish/lib/ezflash.elv"),
        Shell::PowerShell => dirs
            .config_dir()
            .join("powershell/completions/ezflash.ps1"),
        _ => anyhow::bail!(CliError::Usage(format!(
            "Unsupported shell for auto-install: {shell:?}"
        ))),
    };
    Ok(path)
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().ok_or_else(|| {
            CliError::Usage(
                "Could not detect your shell. Please specify it explicitly:\n  \
                 ezflash completions --install bash"
                    .into(),
            )
        })?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = install_path(&dirs, shell)?;

    let mut script = Vec::new();
    write_completions(shell, &mut script);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &script)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => eprintln!(
            "To activate now: {}",
            style(format!("source {}", path.display())).cyan()
        ),
        Shell::Zsh => eprintln!(
            "Add {} to ~/.zshrc before compinit, then restart your shell.",
            style("fpath=(~/.zfunc $fpath)").cyan()
        ),
        Shell::PowerShell => eprintln!(
            "Add {} to your PowerShell profile.",
            style(format!(". {}", path.display())).cyan()
        ),
        _ => eprintln!("Completions load automatically in new sessions."),
    }

    Ok(())
}
