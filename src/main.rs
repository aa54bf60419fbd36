//! Command-line front end for the medical image encryption engine

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use clap::{Parser, Subcommand};
use env_logger::fmt::Color;
use env_logger::Builder;
use log::{error, info, Level, LevelFilter};
use medimg_secure::encryption::metrics;
use medimg_secure::{image_io, Config, IdentityStore, ImageCipher, ImageCryptoError, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "medimg", version, about = "Encrypt medical images to a fixed receiver")]
struct Cli {
    /// Directory holding the receiver key pair (overrides MEDIMG_KEY_DIR)
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// Replace an unreadable receiver key instead of failing
    #[arg(long, global = true)]
    regenerate_on_corrupt: bool,

    /// More log output (-v debug, -vv trace); ignored when RUST_LOG is set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load or create the receiver key pair and print its public key
    Keygen {
        /// Replace the existing key pair
        #[arg(long)]
        force: bool,
    },
    /// Print the receiver public key (PEM)
    PublicKey,
    /// Encrypt an image file
    Encrypt {
        input: PathBuf,
        /// Write the packet here instead of printing the full report
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the packet as raw bytes rather than base64
        #[arg(long, requires = "output")]
        raw: bool,
    },
    /// Decrypt a packet file (base64 or raw) to PNG
    Decrypt {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compare two image files
    Metrics {
        original: PathBuf,
        other: PathBuf,
    },
}

/// Library targets are printed relative to the crate root.
const CRATE_TARGET: &str = "medimg_secure";

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Cyan,
        Level::Trace => Color::White,
    }
}

fn display_target(target: &str) -> &str {
    target
        .strip_prefix(CRATE_TARGET)
        .and_then(|rest| rest.strip_prefix("::"))
        .unwrap_or(target)
}

/// `RUST_LOG` wins when set; otherwise `-v` raises the level from Info.
fn setup_logger(verbose: u8) {
    let mut builder = Builder::from_default_env();

    builder.format(|buf, record| {
        let mut dim = buf.style();
        dim.set_color(Color::Rgb(100, 100, 100));
        let mut level = buf.style();
        level.set_color(level_color(record.level())).set_bold(true);
        let mut target = buf.style();
        target.set_color(Color::Blue);

        writeln!(
            buf,
            "{} {:<5} [{}] {}",
            dim.value(Local::now().format("%H:%M:%S%.3f")),
            level.value(record.level()),
            target.value(display_target(record.target())),
            record.args()
        )
    });

    if std::env::var_os("RUST_LOG").is_none() {
        let filter = match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        builder.filter(None, filter);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.verbose);

    run(cli).map_err(|e| {
        error!("{}", e);
        e
    })
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = cli.key_dir {
        config.key_dir = dir;
    }
    config.regenerate_on_corrupt |= cli.regenerate_on_corrupt;

    let store = IdentityStore::from_config(&config);

    match cli.command {
        Command::Keygen { force } => {
            let identity = if force { store.generate()? } else { store.load()? };
            print!("{}", identity.public_key_pem()?);
        }
        Command::PublicKey => {
            print!("{}", store.load()?.public_key_pem()?);
        }
        Command::Encrypt { input, output, raw } => {
            let cipher = ImageCipher::new(Arc::new(store.load()?));
            let encrypted = cipher.encrypt_image(&read_input(&input)?)?;
            match output {
                Some(path) => {
                    if raw {
                        write_output(&path, &encrypted.packet)?;
                    } else {
                        write_output(&path, encrypted.packet_base64().as_bytes())?;
                    }
                    info!("Packet written to {}", path.display());
                    print_json(&encrypted.metrics)?;
                }
                None => print_json(&encrypted.report())?,
            }
        }
        Command::Decrypt { input, output } => {
            let cipher = ImageCipher::new(Arc::new(store.load()?));
            let contents = read_input(&input)?;
            let decoded = std::str::from_utf8(&contents)
                .ok()
                .and_then(|text| STANDARD.decode(text.trim()).ok());
            let packet = decoded.unwrap_or(contents);

            let png = cipher.decrypt_image(&packet)?;
            write_output(&output, &png)?;
            info!("Decrypted image written to {}", output.display());
        }
        Command::Metrics { original, other } => {
            let a = image_io::decode(&read_input(&original)?)?;
            let b = image_io::decode(&read_input(&other)?)?;
            print_json(&metrics::evaluate(&a, &b))?;
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ImageCryptoError::DecodeError(format!("{}: {}", path.display(), e)))
}

fn write_output(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)
        .map_err(|e| ImageCryptoError::EncodeError(format!("{}: {}", path.display(), e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ImageCryptoError::EncodeError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
