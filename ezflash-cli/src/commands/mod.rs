//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod flash;
pub(crate) mod image;
pub(crate) mod ports;

use {
    crate::{Cli, CliError, use_fancy_output, was_interrupted},
    anyhow::Result,
    indicatif::{ProgressBar, ProgressStyle},
};

/// Fail with a cancellation error once Ctrl-C has been pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted by user".into()).into())
    } else {
        Ok(())
    }
}

/// Byte-count progress bar on stderr, hidden when quiet or not a terminal.
pub(crate) fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}
