use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use vdp_link::UnixLink;
use vdp_registry::{CobsTransport, Registry, Side};
use vdp_schema::{part_ptr, Float64, PartPtr, Record, Text, Uint32};

use crate::cmd::{parse_duration, PublishArgs};
use crate::exit::{link_error, registry_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_session, NegotiationSummary, OutputFormat, Session};

/// Longest wait for queued frames to reach the link before shutting down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(args: PublishArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let config = args.negotiation.config()?;

    let link = UnixLink::connect(&args.path).map_err(|err| link_error("connect failed", err))?;

    let transport = CobsTransport::new(args.transport.config());
    let sender = transport.sender();
    let registry = Arc::new(Registry::new(Side::Controller, transport.sender(), config));
    let channel = registry
        .open_channel(telemetry())
        .map_err(|err| registry_error("open channel failed", err))?;

    let dispatch = Arc::clone(&registry);
    let handle = transport
        .spawn(link, move |packet| dispatch.take_packet(packet))
        .map_err(|err| registry_error("transport start failed", err))?;

    let report = registry.negotiate_report();
    let negotiated = NegotiationSummary::from(&report);
    if !report.all_acked() {
        let session = Session {
            role: "controller",
            negotiated: Some(negotiated),
            updates_sent: 0,
            updates_dropped: 0,
            transport: handle.stats(),
            registry: registry.stats(),
        };
        print_session(&session, format);
        handle.shutdown();
        return Err(CliError::new(
            TIMEOUT,
            format!(
                "negotiation failed: {} channel(s) unacknowledged after {} timed out attempt(s)",
                report.failed.len(),
                report.failed_attempts
            ),
        ));
    }
    info!(channel, "channel negotiated, publishing");

    let mut sent = 0u32;
    let mut dropped = 0u32;
    for update in 0..args.updates {
        if update > 0 {
            thread::sleep(interval);
        }
        if registry.fetch_and_send(channel) {
            sent += 1;
        } else {
            dropped += 1;
        }
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while sender.pending() > 0 && !handle.is_link_finished() {
        if Instant::now() >= deadline {
            warn!(pending = sender.pending(), "gave up waiting for outbound queue to drain");
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let session = Session {
        role: "controller",
        negotiated: Some(negotiated),
        updates_sent: sent,
        updates_dropped: dropped,
        transport: handle.stats(),
        registry: registry.stats(),
    };
    handle.shutdown();
    print_session(&session, format);

    Ok(SUCCESS)
}

/// Demo channel: a sequence number, process uptime and a status line.
fn telemetry() -> PartPtr {
    let started = Instant::now();
    let mut seq = 0u32;
    let record = Record::new("telemetry")
        .field(Uint32::with_fetcher("seq", move || {
            seq = seq.wrapping_add(1);
            seq
        }))
        .field(Float64::with_fetcher("uptime", move || {
            started.elapsed().as_secs_f64()
        }))
        .field(Text::with_fetcher("status", || "ok".to_string()));
    part_ptr(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdp_schema::{lock_part, pretty_print};

    #[test]
    fn telemetry_schema_and_fetch() {
        let part = telemetry();
        let mut guard = lock_part(&part);
        assert_eq!(
            pretty_print(&*guard),
            "telemetry: record[3]{\n  seq: uint32\n  uptime: double\n  status: string\n}"
        );

        guard.fetch();
        guard.fetch();
        let value = guard.value();
        assert_eq!(value["seq"], serde_json::json!(2));
        assert_eq!(value["status"], serde_json::json!("ok"));
    }
}
