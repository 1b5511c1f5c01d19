use serde::Serialize;
use std::io;
use std::net::UdpSocket;
use tracing::warn;

use crate::device::HeaterOutput;

#[derive(Serialize)]
struct RelayControl {
    state: &'static str,
    delay: u32,
}

pub fn set_relay(addr: &str, on: bool, delay: u32) -> io::Result<()> {
    let udp = UdpSocket::bind("0.0.0.0:0")?;
    let msg = RelayControl {
        state: if on { "ON" } else { "OFF" },
        delay,
    };
    let out_bytes = serde_json::to_vec(&msg)?;
    udp.send_to(&out_bytes, addr)?;
    Ok(())
}

/// Solid-state relay behind a network bridge, e.g. "oven-relay.local:4210".
/// Send failures are logged; the control loop never waits on the relay.
pub struct UdpRelay {
    addr: String,
}

impl UdpRelay {
    pub fn new(addr: &str) -> Self {
        UdpRelay {
            addr: addr.to_string(),
        }
    }
}

impl HeaterOutput for UdpRelay {
    fn set(&mut self, on: bool) {
        if let Err(e) = set_relay(&self.addr, on, 0) {
            warn!("[NRELAY] {}: {}", self.addr, e);
        }
    }
}
