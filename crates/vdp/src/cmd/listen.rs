use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use vdp_link::UnixLinkListener;
use vdp_registry::{Channel, CobsTransport, Registry, RegistryConfig, Side};
use vdp_schema::{lock_part, pretty_print};

use crate::cmd::ListenArgs;
use crate::exit::{link_error, registry_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, ChannelEvent, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = UnixLinkListener::bind(&args.path).map_err(|err| link_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(path = %listener.path().display(), "waiting for controller");
    let link = listener
        .accept()
        .map_err(|err| link_error("accept failed", err))?;

    let transport = CobsTransport::new(args.transport.config());
    let registry = Arc::new(Registry::new(
        Side::Listener,
        transport.sender(),
        RegistryConfig::default(),
    ));

    let (tx, rx) = mpsc::channel();
    registry.set_on_broadcast(forward("broadcast", tx.clone()));
    registry.set_on_data(forward("data", tx));

    let dispatch = Arc::clone(&registry);
    let handle = transport
        .spawn(link, move |packet| dispatch.take_packet(packet))
        .map_err(|err| registry_error("transport start failed", err))?;

    let mut data_events = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                let is_data = event.event == "data";
                print_event(&event, format);
                if is_data {
                    data_events = data_events.saturating_add(1);
                    if args.count.is_some_and(|count| data_events >= count) {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if handle.is_link_finished() {
                    info!("controller disconnected");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let transport_stats = handle.stats();
    handle.shutdown();
    let stats = registry.stats();
    info!(
        data_events,
        channels = registry.remote_channels().len(),
        frames_received = transport_stats.frames_received,
        bad_checksum = stats.bad_checksum,
        out_of_order = stats.out_of_order,
        unknown_channel = stats.unknown_channel,
        "listen finished"
    );

    Ok(SUCCESS)
}

/// Callback that turns a remote channel into an event for the main thread.
fn forward(event: &'static str, tx: Sender<ChannelEvent>) -> impl FnMut(&Channel) + Send + 'static {
    move |channel: &Channel| {
        let part = lock_part(&channel.data);
        let out = ChannelEvent::new(
            event,
            channel.id,
            part.name().to_owned(),
            pretty_print(&*part),
            part.value(),
        );
        drop(part);
        let _ = tx.send(out);
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
