//! Image info and convert command implementations.

use {
    crate::Cli,
    anyhow::{Context, Result},
    console::style,
    ezflash::{ImageFormat, SegmentMap, load_image},
    log::warn,
    std::{fs, path::Path},
};

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::IntelHex => "Intel HEX",
        ImageFormat::TiTxt => "TI-TXT",
    }
}

fn load(image: &Path, chunk_size: usize) -> Result<(ImageFormat, SegmentMap)> {
    let format = ImageFormat::from_path(image)?;
    let segments = load_image(image, chunk_size)
        .with_context(|| format!("Failed to load image {}", image.display()))?;
    Ok((format, segments))
}

/// Info command implementation.
pub(crate) fn cmd_info(image: &Path, json: bool, chunk_size: usize) -> Result<()> {
    let (format, segments) = load(image, chunk_size)?;
    let overlap = segments.find_overlap();

    if json {
        let list: Vec<serde_json::Value> = segments
            .iter()
            .map(|(address, data)| {
                serde_json::json!({
                    "address": address,
                    "length": data.len(),
                })
            })
            .collect();
        let span = segments
            .span()
            .map(|(start, end)| serde_json::json!({ "start": start, "end": end }));
        let overlap = overlap.map(|(earlier, later)| [earlier, later]);
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "file": image.display().to_string(),
                "format": format_name(format),
                "segment_count": segments.len(),
                "total_bytes": segments.total_bytes(),
                "span": span,
                "overlap": overlap,
                "segments": list,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", style("Image Information").bold().underlined());
    println!("  File:     {}", image.display());
    println!("  Format:   {}", format_name(format));
    println!("  Segments: {}", segments.len());
    println!("  Bytes:    {}", segments.total_bytes());
    if let Some((start, end)) = segments.span() {
        println!("  Span:     0x{start:04X}-0x{:04X}", end.saturating_sub(1));
    }
    println!();

    for (address, data) in segments.iter() {
        println!(
            "  {} 0x{address:04X}  {:>5} bytes",
            style("•").dim(),
            data.len()
        );
    }

    if let Some((earlier, later)) = overlap {
        warn!("Segments {earlier:#06x} and {later:#06x} overlap");
    }
    Ok(())
}

/// Convert command implementation.
pub(crate) fn cmd_convert(
    cli: &Cli,
    image: &Path,
    output: &Path,
    fill: u8,
    flip: bool,
    chunk_size: usize,
) -> Result<()> {
    let (_, segments) = load(image, chunk_size)?;
    let flat = segments.to_flat_image(fill, flip)?;

    fs::write(output, &flat).with_context(|| format!("Failed to write {}", output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Wrote {} bytes ({} segments{}) to {}",
            style("✓").green(),
            flat.len(),
            segments.len(),
            if flip { ", bit-reversed" } else { "" },
            output.display()
        );
    }
    Ok(())
}
