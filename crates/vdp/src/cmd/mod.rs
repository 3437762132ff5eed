use std::path::PathBuf;
use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Args, Subcommand};
use vdp_link::LinkConfig;
use vdp_registry::{RegistryConfig, TransportConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod frame;
pub mod listen;
pub mod publish;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept one peer as listener and print announced channels and data.
    Listen(ListenArgs),
    /// Connect as controller, negotiate a telemetry channel and publish updates.
    Publish(PublishArgs),
    /// Encode, decode or check single frames given as hex.
    Frame(FrameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Publish(args) => publish::run(args, format),
        Command::Frame(args) => frame::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Transport loop knobs shared by the link commands.
#[derive(Args, Debug, Clone)]
pub struct TransportArgs {
    /// Line rate applied to the link before the loops start.
    #[arg(long, default_value_t = vdp_link::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Frames each queue holds before dropping.
    #[arg(long, default_value_t = vdp_registry::DEFAULT_QUEUE_CAPACITY, value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub queue_capacity: usize,
    /// Also send a delimiter before each frame.
    #[arg(long)]
    pub leading_delimiter: bool,
}

impl TransportArgs {
    pub fn config(&self) -> TransportConfig {
        TransportConfig {
            link: LinkConfig {
                baud_rate: self.baud,
            },
            queue_capacity: self.queue_capacity,
            leading_delimiter: self.leading_delimiter,
            ..TransportConfig::default()
        }
    }
}

/// Negotiation knobs.
#[derive(Args, Debug, Clone)]
pub struct NegotiationArgs {
    /// Wait per broadcast attempt (e.g. 500ms, 2s).
    #[arg(long, default_value = "500ms")]
    pub ack_timeout: String,
    /// Broadcast attempts per channel.
    #[arg(long, default_value_t = vdp_registry::DEFAULT_BROADCAST_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: u32,
}

impl NegotiationArgs {
    pub fn config(&self) -> CliResult<RegistryConfig> {
        Ok(RegistryConfig {
            ack_timeout: parse_duration(&self.ack_timeout)?,
            broadcast_attempts: self.attempts,
        })
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N data updates.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Data updates to send after negotiation.
    #[arg(long, default_value_t = 10)]
    pub updates: u32,
    /// Delay between updates (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    #[command(flatten)]
    pub negotiation: NegotiationArgs,
    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    #[command(subcommand)]
    pub command: FrameCommand,
}

#[derive(Subcommand, Debug)]
pub enum FrameCommand {
    /// COBS-encode a payload.
    Encode {
        /// Payload bytes as hex (whitespace allowed).
        hex: String,
        /// Emit a leading delimiter as well.
        #[arg(long)]
        leading_delimiter: bool,
    },
    /// COBS-decode a frame.
    Decode {
        /// Frame bytes as hex (whitespace allowed).
        hex: String,
    },
    /// Check a decoded packet's size and checksum trailer.
    Check {
        /// Packet bytes as hex (whitespace allowed).
        hex: String,
    },
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input has an odd number of digits"));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte: {}", &digits[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_hex_accepts_spacing() {
        assert_eq!(parse_hex("11 22 00 33").unwrap(), vec![0x11, 0x22, 0x00, 0x33]);
        assert_eq!(parse_hex("0xA005").unwrap(), vec![0xA0, 0x05]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }
}
