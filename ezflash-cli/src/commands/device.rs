//! Identify, erase, read and reset command implementations.

use {
    crate::{
        Cli, Settings,
        commands::{ensure_not_interrupted, progress_bar},
    },
    anyhow::{Context, Result},
    console::style,
    ezflash::target::ez430::protocol::MAX_READ_LEN,
    std::{fs, path::Path},
};

/// Identify command implementation.
pub(crate) fn cmd_identify(cli: &Cli, settings: &Settings, json: bool) -> Result<()> {
    let mut session = settings.connect(cli.quiet || json)?;
    let device = session.identify().context("Failed to identify target")?;
    session.close()?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "port": settings.port,
                "device": device,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{device}");
    }
    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, settings: &Settings) -> Result<()> {
    let mut session = settings.connect(cli.quiet)?;
    let device = session.identify().context("Failed to identify target")?;

    if !cli.quiet {
        eprintln!(
            "{} Erasing {} flash...",
            style("⏳").yellow(),
            style(&device.part).bold()
        );
    }
    session.erase_all().context("Erase failed")?;
    session.close()?;

    if !cli.quiet {
        eprintln!("{} Erase complete", style("✓").green());
    }
    Ok(())
}

/// Read command implementation.
///
/// Larger reads are split into frames of at most [`MAX_READ_LEN`] bytes.
pub(crate) fn cmd_read(
    cli: &Cli,
    settings: &Settings,
    address: u32,
    length: usize,
    output: Option<&Path>,
) -> Result<()> {
    let mut session = settings.connect(cli.quiet)?;
    session.identify().context("Failed to identify target")?;

    let pb = progress_bar(cli, length);
    pb.set_message("reading");
    let mut data = Vec::with_capacity(length);
    while data.len() < length {
        ensure_not_interrupted()?;
        let offset = u32::try_from(data.len())?;
        let chunk_address = address
            .checked_add(offset)
            .context("Read range runs past the end of the address space")?;
        let want = (length - data.len()).min(MAX_READ_LEN);
        let chunk = session
            .read_memory(chunk_address, want)
            .with_context(|| format!("Read at {chunk_address:#06x} failed"))?;
        if chunk.is_empty() {
            anyhow::bail!("Adapter returned no data at {chunk_address:#06x}");
        }
        data.extend_from_slice(&chunk);
        pb.set_position(data.len() as u64);
    }
    pb.finish_and_clear();
    data.truncate(length);
    session.close()?;

    match output {
        Some(path) => {
            fs::write(path, &data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} Saved {} bytes to {}",
                    style("✓").green(),
                    data.len(),
                    path.display()
                );
            }
        },
        None => print!("{}", hex_dump(address, &data)),
    }
    Ok(())
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, settings: &Settings, success: bool) -> Result<()> {
    let mut session = settings.connect(cli.quiet)?;
    session.reset(!success).context("Reset failed")?;
    session.close()?;

    if !cli.quiet {
        eprintln!("{} Target reset", style("✓").green());
    }
    Ok(())
}

/// Format `data` as 16-byte rows prefixed with their address.
fn hex_dump(address: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let row_address = u64::from(address) + (row as u64) * 16;
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        out.push_str(&format!("{row_address:08X}: {}\n", bytes.join(" ")));
    }
    out
}
