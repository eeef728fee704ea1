//! ezflash CLI - Command-line tool for programming MSP430 targets.
//!
//! ## Features
//!
//! - Flash Intel HEX (`.a43`) and TI-TXT images through the eZ430 adapter
//! - Identify, erase, read back and reset the target
//! - Inspect images and convert them to flat binaries
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    ezflash::{Session, SessionConfig, WireMode, image::DEFAULT_CHUNK_SIZE},
    log::{debug, warn},
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    },
};

mod commands;
mod config;

use {
    commands::{
        completions::{cmd_completions, cmd_completions_install},
        device::{cmd_erase, cmd_identify, cmd_read, cmd_reset},
        flash::cmd_flash,
        image::{cmd_convert, cmd_info},
        ports::cmd_list_ports,
    },
    config::Config,
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Serial port used when neither flags, environment nor config name one.
const DEFAULT_PORT: &str = "/dev/ttyUSB1";

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI-level failures with their own exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration (exit code 3).
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// ezflash - Program MSP430 flash through the TI eZ430 USB adapter.
///
/// Environment variables:
///   EZFLASH_PORT        - Serial port of the adapter (default: /dev/ttyUSB1)
///   EZFLASH_MILLIVOLTS  - Target supply voltage (default: 2700)
///   EZFLASH_WIRE_MODE   - Debug interface: sbw or jtag (default: sbw)
///   EZFLASH_TIMEOUT_MS  - Response timeout in milliseconds (default: 3000)
///   EZFLASH_RETRIES     - Retries after a corrupted or missing response (default: 0)
#[derive(Parser)]
#[command(name = "ezflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port of the eZ430 adapter.
    #[arg(short, long, global = true, env = "EZFLASH_PORT")]
    port: Option<String>,

    /// Target supply voltage in millivolts.
    #[arg(long, global = true, env = "EZFLASH_MILLIVOLTS")]
    millivolts: Option<u16>,

    /// Debug interface wiring (sbw, jtag).
    #[arg(long, global = true, env = "EZFLASH_WIRE_MODE", value_parser = parse_wire_mode)]
    wire_mode: Option<WireMode>,

    /// Response timeout in milliseconds.
    #[arg(long, global = true, env = "EZFLASH_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Retries after a corrupted or missing response.
    #[arg(long, global = true, env = "EZFLASH_RETRIES")]
    retries: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Erase, write and optionally verify an image.
    Flash {
        /// Image file (.a43/.hex Intel HEX, .txt TI-TXT).
        image: PathBuf,

        /// Read the image back after writing.
        #[arg(long)]
        verify: bool,

        /// Reset the target when done.
        #[arg(long)]
        reset: bool,

        /// Skip the mass erase before writing.
        #[arg(long)]
        no_erase: bool,

        /// Segment size for TI-TXT images.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Identify the attached target.
    Identify {
        /// Output the device descriptor as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Mass-erase the target's flash.
    Erase,

    /// Read target memory.
    Read {
        /// Start address (hex, 0x prefix optional).
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (decimal or 0x-prefixed hex).
        #[arg(short, long, value_parser = parse_length)]
        length: usize,

        /// Write raw bytes to this file instead of a hex dump on stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reset the target.
    Reset {
        /// Report a successful run to the adapter.
        #[arg(long)]
        success: bool,
    },

    /// Show the segments of an image file.
    Info {
        /// Image file (.a43/.hex Intel HEX, .txt TI-TXT).
        image: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Segment size for TI-TXT images.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Convert an image to a flat binary.
    Convert {
        /// Image file (.a43/.hex Intel HEX, .txt TI-TXT).
        image: PathBuf,

        /// Output binary file.
        #[arg(short, long)]
        output: PathBuf,

        /// Byte used for gaps between segments (hex).
        #[arg(long, default_value = "0xFF", value_parser = parse_hex_u8)]
        fill: u8,

        /// Reverse the bit order of every data byte.
        #[arg(long)]
        flip: bool,

        /// Segment size for TI-TXT images.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0xF8_00
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a single hex byte.
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Fill byte out of range: {s}"))
}

/// Parse a length in decimal, or hex with a 0x prefix.
fn parse_length(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let parsed = if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex_u32(s).map(|v| v as usize)
    } else {
        s.parse::<usize>()
            .map_err(|e| format!("Invalid length: {e}"))
    }?;
    if parsed == 0 {
        return Err("Length must be non-zero".into());
    }
    Ok(parsed)
}

fn parse_wire_mode(s: &str) -> Result<WireMode, String> {
    WireMode::from_name(s).ok_or_else(|| format!("Unknown wire mode '{s}' (expected sbw or jtag)"))
}

/// Effective settings after layering flags, environment and config files.
pub(crate) struct Settings {
    /// Adapter serial port.
    pub port: String,
    /// Session settings.
    pub session: SessionConfig,
    /// Segment size for TI-TXT images.
    pub chunk_size: usize,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let defaults = SessionConfig::default();

        let wire_mode = match cli.wire_mode {
            Some(mode) => mode,
            None => config.wire_mode()?.unwrap_or(defaults.wire_mode),
        };
        let timeout = cli
            .timeout_ms
            .or(config.connection.timeout_ms)
            .map_or(defaults.timeout, Duration::from_millis);

        let session = SessionConfig::default()
            .with_millivolts(
                cli.millivolts
                    .or(config.target.millivolts)
                    .unwrap_or(defaults.millivolts),
            )
            .with_wire_mode(wire_mode)
            .with_timeout(timeout)
            .with_retries(
                cli.retries
                    .or(config.connection.retries)
                    .unwrap_or(defaults.retries),
            );

        let port = cli
            .port
            .clone()
            .or_else(|| config.connection.port.clone())
            .unwrap_or_else(|| DEFAULT_PORT.to_string());

        Ok(Self {
            port,
            session,
            chunk_size: config.image.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
        })
    }

    /// TI-TXT segment size, with a per-command override.
    pub(crate) fn chunk_size(&self, over: Option<usize>) -> Result<usize> {
        let size = over.unwrap_or(self.chunk_size);
        if size == 0 {
            return Err(CliError::Usage("--chunk-size must be non-zero".into()).into());
        }
        Ok(size)
    }

    /// Open and configure the adapter.
    pub(crate) fn connect(&self, quiet: bool) -> Result<Session<ezflash::NativePort>> {
        if !quiet {
            eprintln!(
                "{} Using {} ({}, {} mV)",
                style("🔌").cyan(),
                style(&self.port).cyan(),
                self.session.wire_mode,
                self.session.millivolts
            );
        }
        Session::connect(&self.port, self.session.clone())
            .with_context(|| format!("Failed to open adapter on {}", self.port))
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => 2,
                CliError::Config(_) => 3,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<ezflash::Error>() {
            return match lib_err {
                ezflash::Error::DeviceNotFound | ezflash::Error::Serial(_) => 4,
                ezflash::Error::Interrupted => 130,
                ezflash::Error::Config(_) => 3,
                _ => 1,
            };
        }
    }
    1
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ezflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        warn!("Could not install Ctrl-C handler: {e}");
    }
    ezflash::set_interrupt_checker(was_interrupted);

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let settings = Settings::resolve(cli, &config)?;

    match &cli.command {
        Commands::Flash {
            image,
            verify,
            reset,
            no_erase,
            chunk_size,
        } => {
            let options = commands::flash::FlashOptions {
                verify: *verify,
                reset: *reset,
                erase: !*no_erase,
                chunk_size: settings.chunk_size(*chunk_size)?,
            };
            cmd_flash(cli, &settings, image, &options)
        },
        Commands::Identify { json } => cmd_identify(cli, &settings, *json),
        Commands::Erase => cmd_erase(cli, &settings),
        Commands::Read {
            address,
            length,
            output,
        } => cmd_read(cli, &settings, *address, *length, output.as_deref()),
        Commands::Reset { success } => cmd_reset(cli, &settings, *success),
        Commands::Info {
            image,
            json,
            chunk_size,
        } => cmd_info(image, *json, settings.chunk_size(*chunk_size)?),
        Commands::Convert {
            image,
            output,
            fill,
            flip,
            chunk_size,
        } => cmd_convert(
            cli,
            image,
            output,
            *fill,
            *flip,
            settings.chunk_size(*chunk_size)?,
        ),
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell, install } => {
            if *install {
                cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: ezflash completions bash \
                         (or use --install to auto-install)"
                            .into(),
                    )
                })?;
                cmd_completions(shell);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from(["ezflash", "flash", "blink.a43"]).unwrap();
        match cli.command {
            Commands::Flash {
                image,
                verify,
                reset,
                no_erase,
                chunk_size,
            } => {
                assert_eq!(image, PathBuf::from("blink.a43"));
                assert!(!verify);
                assert!(!reset);
                assert!(!no_erase);
                assert!(chunk_size.is_none());
            },
            _ => panic!("Expected Flash command"),
        }
    }

    #[test]
    fn test_cli_parse_flash_with_all_options() {
        let cli = Cli::try_parse_from([
            "ezflash",
            "-p",
            "/dev/ttyACM0",
            "--wire-mode",
            "jtag",
            "--millivolts",
            "3300",
            "flash",
            "app.txt",
            "--verify",
            "--reset",
            "--no-erase",
            "--chunk-size",
            "64",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.wire_mode, Some(WireMode::FourWire));
        assert_eq!(cli.millivolts, Some(3300));
        match cli.command {
            Commands::Flash {
                verify,
                reset,
                no_erase,
                chunk_size,
                ..
            } => {
                assert!(verify && reset && no_erase);
                assert_eq!(chunk_size, Some(64));
            },
            _ => panic!("Expected Flash command"),
        }
    }

    #[test]
    fn test_cli_parse_read() {
        let cli = Cli::try_parse_from([
            "ezflash", "read", "--address", "0xF800", "--length", "256", "-o", "dump.bin",
        ])
        .unwrap();
        match cli.command {
            Commands::Read {
                address,
                length,
                output,
            } => {
                assert_eq!(address, 0xF800);
                assert_eq!(length, 256);
                assert_eq!(output, Some(PathBuf::from("dump.bin")));
            },
            _ => panic!("Expected Read command"),
        }
    }

    #[test]
    fn test_cli_parse_convert_defaults() {
        let cli = Cli::try_parse_from(["ezflash", "convert", "app.a43", "-o", "app.bin"]).unwrap();
        match cli.command {
            Commands::Convert { fill, flip, .. } => {
                assert_eq!(fill, 0xFF);
                assert!(!flip);
            },
            _ => panic!("Expected Convert command"),
        }
    }

    #[test]
    fn test_cli_invalid_wire_mode() {
        assert!(Cli::try_parse_from(["ezflash", "--wire-mode", "usb", "erase"]).is_err());
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["ezflash"]).is_err());
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0xF800"), Ok(0xF800));
        assert_eq!(parse_hex_u32("f800"), Ok(0xF800));
        assert_eq!(parse_hex_u32("0x00_01_00_00"), Ok(0x1_0000));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0x00"), Ok(0));
        assert_eq!(parse_hex_u8("ff"), Ok(0xFF));
        assert!(parse_hex_u8("0x100").is_err());
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("128"), Ok(128));
        assert_eq!(parse_length("0x80"), Ok(128));
        assert!(parse_length("0").is_err());
        assert!(parse_length("-1").is_err());
    }

    #[test]
    fn test_settings_layering() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyUSB3".into());
        config.connection.retries = Some(2);
        config.target.millivolts = Some(3000);
        config.target.wire_mode = Some("jtag".into());
        config.image.chunk_size = Some(16);

        let cli = Cli::try_parse_from(["ezflash", "--millivolts", "3600", "erase"]).unwrap();
        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(settings.port, "/dev/ttyUSB3");
        assert_eq!(settings.session.millivolts, 3600);
        assert_eq!(settings.session.wire_mode, WireMode::FourWire);
        assert_eq!(settings.session.retries, 2);
        assert_eq!(settings.chunk_size(None).unwrap(), 16);
        assert_eq!(settings.chunk_size(Some(8)).unwrap(), 8);
        assert!(settings.chunk_size(Some(0)).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let cli = Cli::try_parse_from(["ezflash", "erase"]).unwrap();
        let settings = Settings::resolve(&cli, &Config::default()).unwrap();
        assert_eq!(settings.session.millivolts, 2700);
        assert_eq!(settings.session.wire_mode, WireMode::SpyBiWire);
        assert_eq!(settings.session.timeout, Duration::from_secs(3));
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_cli_error_displays_message_only() {
        assert_eq!(
            CliError::Usage("--chunk-size must be non-zero".into()).to_string(),
            "--chunk-size must be non-zero"
        );
        assert_eq!(
            CliError::Config("bad wire_mode".into()).to_string(),
            "bad wire_mode"
        );

        let err = anyhow::Error::new(CliError::Cancelled("Interrupted by user".into()))
            .context("Write failed");
        assert_eq!(format!("{err:#}"), "Write failed: Interrupted by user");
        assert_eq!(exit_code_for(&err), 130);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code_for(&CliError::Usage("x".into()).into()),
            2
        );
        assert_eq!(
            exit_code_for(&CliError::Cancelled("x".into()).into()),
            130
        );
        assert_eq!(
            exit_code_for(&anyhow::Error::new(ezflash::Error::DeviceNotFound).context("identify")),
            4
        );
        assert_eq!(
            exit_code_for(&ezflash::Error::Interrupted.into()),
            130
        );
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 1);
    }
}
