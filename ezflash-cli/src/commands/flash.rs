//! Flash command implementation.

use {
    crate::{
        Cli, CliError, Settings,
        commands::{ensure_not_interrupted, progress_bar},
    },
    anyhow::{Context, Result},
    console::style,
    ezflash::{DeviceDescriptor, SegmentMap, load_image},
    log::warn,
    std::path::Path,
};

/// What `flash` does besides writing.
pub(crate) struct FlashOptions {
    /// Read the image back after writing.
    pub verify: bool,
    /// Reset the target at the end.
    pub reset: bool,
    /// Mass-erase before writing.
    pub erase: bool,
    /// TI-TXT segment size.
    pub chunk_size: usize,
}

/// Warn about segments that fall outside the target's flash.
fn check_ranges(image: &SegmentMap, device: &DeviceDescriptor) {
    for (address, data) in image.iter() {
        let Some(last) = u32::try_from(data.len())
            .ok()
            .and_then(|len| address.checked_add(len.saturating_sub(1)))
        else {
            continue;
        };
        let in_flash = |a: u32| device.main_memory.contains(a) || device.info_memory.contains(a);
        if !in_flash(address) || !in_flash(last) {
            warn!(
                "Segment {address:#06x}..{last:#06x} is outside {}'s flash (main {}, info {})",
                device.part, device.main_memory, device.info_memory
            );
        }
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    settings: &Settings,
    image_path: &Path,
    options: &FlashOptions,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("📦").cyan(),
            image_path.display()
        );
    }

    let image = load_image(image_path, options.chunk_size)
        .with_context(|| format!("Failed to load image {}", image_path.display()))?;
    if image.is_empty() {
        return Err(CliError::Usage(format!(
            "{} contains no data records",
            image_path.display()
        ))
        .into());
    }
    if let Some((earlier, later)) = image.find_overlap() {
        warn!("Segments {earlier:#06x} and {later:#06x} overlap; {later:#06x} is written last");
    }

    if !cli.quiet {
        eprintln!(
            "{} {} segments, {} bytes",
            style("ℹ").blue(),
            image.len(),
            image.total_bytes()
        );
    }

    let mut session = settings.connect(cli.quiet)?;
    let device = session.identify().context("Failed to identify target")?;
    session.identify_extended().context("Failed to identify target")?;
    if !cli.quiet {
        eprintln!("{} Found {}", style("✓").green(), style(&device.part).bold());
    }
    check_ranges(&image, &device);
    ensure_not_interrupted()?;

    if options.erase {
        if !cli.quiet {
            eprintln!("{} Erasing flash...", style("⏳").yellow());
        }
        session.erase_all().context("Erase failed")?;
    }
    ensure_not_interrupted()?;

    let pb = progress_bar(cli, image.total_bytes());
    pb.set_message("writing");
    session
        .write_memory_with_progress(&image, &mut |done, _total| pb.set_position(done as u64))
        .context("Write failed")?;
    pb.finish_and_clear();
    if !cli.quiet {
        eprintln!("{} Wrote {} bytes", style("✓").green(), image.total_bytes());
    }

    if options.verify {
        let pb = progress_bar(cli, image.total_bytes());
        pb.set_message("verifying");
        let checked = session
            .check_memory_with_progress(&image, &mut |done, _total| pb.set_position(done as u64));
        pb.finish_and_clear();
        checked.context("Verification failed")?;
        if !cli.quiet {
            eprintln!("{} Verified", style("✓").green());
        }
    }

    if options.reset {
        if !cli.quiet {
            eprintln!("{} Resetting target...", style("↻").cyan());
        }
        session.reset(true).context("Reset failed")?;
    }

    session.close()?;
    if !cli.quiet {
        eprintln!("{} Done", style("🎉").green().bold());
    }
    Ok(())
}
