//! Port listing command implementation.

use {
    anyhow::Result,
    console::style,
    ezflash::{NativePortEnumerator, PortEnumerator, PortInfo},
    log::warn,
};

fn discover_ports() -> Vec<PortInfo> {
    NativePortEnumerator::list_ports().unwrap_or_else(|e| {
        warn!("Could not enumerate serial ports: {e}");
        Vec::new()
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = discover_ports();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Available Serial Ports").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        let tag = if port.is_ez430() {
            format!(" [{}]", style("eZ430").yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{tag}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }

    if let Some(adapter) = ports.iter().find(|p| p.is_ez430()) {
        eprintln!(
            "\n{} eZ430 adapter on {} (pass it with --port)",
            style("→").green().bold(),
            style(&adapter.name).cyan().bold()
        );
    }
    Ok(())
}
