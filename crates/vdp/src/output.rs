use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use vdp_frame::{hex_dump, PacketHeader, PacketValidity};
use vdp_registry::{NegotiationReport, RegistryStats, TransportStats};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Something the listener saw on a remote channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
    pub event: &'static str,
    pub channel: u8,
    pub name: String,
    pub schema: String,
    pub value: Value,
    pub timestamp: String,
}

impl ChannelEvent {
    pub fn new(event: &'static str, channel: u8, name: String, schema: String, value: Value) -> Self {
        Self {
            event,
            channel,
            name,
            schema,
            value,
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_event(event: &ChannelEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "CHANNEL", "NAME", "VALUE"])
                .add_row(vec![
                    event.event.to_string(),
                    event.channel.to_string(),
                    event.name.clone(),
                    event.value.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if event.event == "broadcast" {
                println!("channel {} announced:\n{}", event.channel, event.schema);
            } else {
                println!(
                    "channel={} name={} value={}",
                    event.channel, event.name, event.value
                );
            }
        }
        OutputFormat::Raw => {
            print_raw(event.value.to_string().as_bytes());
            print_raw(b"\n");
        }
    }
}

#[derive(Serialize)]
struct BytesOutput<'a> {
    operation: &'a str,
    input_size: usize,
    output_size: usize,
    output: String,
}

/// Result of a `frame encode` or `frame decode`.
pub fn print_bytes(operation: &str, input_size: usize, output: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&BytesOutput {
            operation,
            input_size,
            output_size: output.len(),
            output: hex_dump(output).replace('\n', " "),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "IN", "OUT", "BYTES"])
                .add_row(vec![
                    operation.to_string(),
                    input_size.to_string(),
                    output.len().to_string(),
                    hex_dump(output),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex_dump(output)),
        OutputFormat::Raw => print_raw(output),
    }
}

#[derive(Serialize)]
struct CheckOutput {
    size: usize,
    validity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    packet_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<String>,
}

pub fn validity_name(validity: PacketValidity) -> &'static str {
    match validity {
        PacketValidity::Ok => "ok",
        PacketValidity::TooSmall => "too_small",
        PacketValidity::BadChecksum => "bad_checksum",
    }
}

/// Result of a `frame check`. The header is only shown for valid packets.
pub fn print_check(
    size: usize,
    validity: PacketValidity,
    header: Option<PacketHeader>,
    format: OutputFormat,
) {
    let out = CheckOutput {
        size,
        validity: validity_name(validity),
        packet_type: header.map(|h| format!("{:?}", h.ty).to_lowercase()),
        function: header.map(|h| format!("{:?}", h.func).to_lowercase()),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SIZE", "VALIDITY", "TYPE", "FUNCTION"])
                .add_row(vec![
                    out.size.to_string(),
                    out.validity.to_string(),
                    out.packet_type.clone().unwrap_or_else(|| "-".into()),
                    out.function.clone().unwrap_or_else(|| "-".into()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "size={} validity={} type={} function={}",
                out.size,
                out.validity,
                out.packet_type.as_deref().unwrap_or("-"),
                out.function.as_deref().unwrap_or("-")
            );
        }
    }
}

#[derive(Serialize)]
struct SessionSummary<'a> {
    role: &'a str,
    negotiated: Option<&'a NegotiationSummary>,
    updates_sent: u32,
    updates_dropped: u32,
    transport: TransportSummary,
    registry: RegistrySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationSummary {
    pub acked: Vec<u8>,
    pub failed: Vec<u8>,
    pub failed_attempts: u32,
}

impl From<&NegotiationReport> for NegotiationSummary {
    fn from(report: &NegotiationReport) -> Self {
        Self {
            acked: report.acked.clone(),
            failed: report.failed.clone(),
            failed_attempts: report.failed_attempts,
        }
    }
}

#[derive(Serialize)]
struct TransportSummary {
    frames_sent: u64,
    frames_received: u64,
    outbound_dropped: u64,
    inbound_dropped: u64,
    oversize_frames: u64,
}

#[derive(Serialize)]
struct RegistrySummary {
    bad_checksum: u64,
    too_small: u64,
    out_of_order: u64,
    unknown_channel: u64,
    malformed: u64,
    ack_timeouts: u64,
}

/// Counters gathered over one `publish` session.
pub struct Session<'a> {
    pub role: &'a str,
    pub negotiated: Option<NegotiationSummary>,
    pub updates_sent: u32,
    pub updates_dropped: u32,
    pub transport: TransportStats,
    pub registry: RegistryStats,
}

pub fn print_session(session: &Session<'_>, format: OutputFormat) {
    let out = SessionSummary {
        role: session.role,
        negotiated: session.negotiated.as_ref(),
        updates_sent: session.updates_sent,
        updates_dropped: session.updates_dropped,
        transport: TransportSummary {
            frames_sent: session.transport.frames_sent,
            frames_received: session.transport.frames_received,
            outbound_dropped: session.transport.outbound_dropped,
            inbound_dropped: session.transport.inbound_dropped,
            oversize_frames: session.transport.oversize_frames,
        },
        registry: RegistrySummary {
            bad_checksum: session.registry.bad_checksum,
            too_small: session.registry.too_small,
            out_of_order: session.registry.out_of_order,
            unknown_channel: session.registry.unknown_channel,
            malformed: session.registry.malformed,
            ack_timeouts: session.registry.ack_timeouts,
        },
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            if let Some(negotiated) = out.negotiated {
                table.add_row(vec!["acked".to_string(), format!("{:?}", negotiated.acked)]);
                table.add_row(vec!["failed".to_string(), format!("{:?}", negotiated.failed)]);
                table.add_row(vec![
                    "failed_attempts".to_string(),
                    negotiated.failed_attempts.to_string(),
                ]);
            }
            table.add_row(vec!["updates_sent".to_string(), out.updates_sent.to_string()]);
            table.add_row(vec![
                "updates_dropped".to_string(),
                out.updates_dropped.to_string(),
            ]);
            table.add_row(vec![
                "frames_sent".to_string(),
                out.transport.frames_sent.to_string(),
            ]);
            table.add_row(vec![
                "frames_received".to_string(),
                out.transport.frames_received.to_string(),
            ]);
            table.add_row(vec![
                "bad_checksum".to_string(),
                out.registry.bad_checksum.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "{}: sent={} dropped={} frames_out={} frames_in={} bad_checksum={}",
                out.role,
                out.updates_sent,
                out.updates_dropped,
                out.transport.frames_sent,
                out.transport.frames_received,
                out.registry.bad_checksum
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
