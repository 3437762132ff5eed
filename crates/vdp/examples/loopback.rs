//! Loopback example: a controller and a listener over an in-memory link.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vdp::link::MemoryLink;
use vdp::registry::{CobsTransport, Registry, RegistryConfig, Side, TransportConfig};
use vdp::schema::{lock_part, part_ptr, pretty_print, Float32, Int16, PartPtr, Record};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (controller_link, listener_link) = MemoryLink::pair();

    // Listener: prints what the controller announces and publishes.
    let listener_transport = CobsTransport::new(TransportConfig::default());
    let listener = Arc::new(Registry::new(
        Side::Listener,
        listener_transport.sender(),
        RegistryConfig::default(),
    ));
    let (tx, rx) = mpsc::channel();
    listener.set_on_broadcast(|channel| {
        eprintln!(
            "[listener] channel {} announced:\n{}",
            channel.id,
            pretty_print(&*lock_part(&channel.data))
        );
    });
    listener.set_on_data(move |channel| {
        let _ = tx.send(lock_part(&channel.data).value());
    });
    let dispatch = Arc::clone(&listener);
    let _listener_handle =
        listener_transport.spawn(listener_link, move |packet| dispatch.take_packet(packet))?;

    // Controller: one channel whose fields the application keeps typed
    // handles to.
    let transport = CobsTransport::new(TransportConfig::default());
    let controller = Arc::new(Registry::new(
        Side::Controller,
        transport.sender(),
        RegistryConfig::default(),
    ));
    let left = Arc::new(Mutex::new(Float32::new("left")));
    let heading = Arc::new(Mutex::new(Int16::new("heading")));
    let drive = part_ptr(
        Record::new("drive")
            .field_ptr(left.clone() as PartPtr)
            .field(Float32::new("right"))
            .field_ptr(heading.clone() as PartPtr),
    );
    let channel = controller.open_channel(drive.clone())?;
    let dispatch = Arc::clone(&controller);
    let _controller_handle =
        transport.spawn(controller_link, move |packet| dispatch.take_packet(packet))?;

    if !controller.negotiate() {
        return Err("listener did not acknowledge the channel".into());
    }

    for step in 0..3i16 {
        left.lock().expect("left lock").set(0.5 * f32::from(step));
        heading.lock().expect("heading lock").set(90 * step);
        if !controller.send_data(channel, drive.clone()) {
            eprintln!("[controller] update {step} dropped");
            continue;
        }
        let value = rx.recv_timeout(Duration::from_secs(1))?;
        eprintln!("[listener] update {step}: {value}");
    }

    let stats = listener.stats();
    eprintln!(
        "[listener] channels={} bad_checksum={} out_of_order={}",
        listener.remote_channels().len(),
        stats.bad_checksum,
        stats.out_of_order
    );
    Ok(())
}
