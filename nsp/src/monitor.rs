use std::io::BufRead;
use std::net::Ipv4Addr;
use std::sync::Arc;

use structopt::StructOpt;

use nsp_device::{Device, Params};
use nsp_protocol::types::ChannelClass;

use crate::RunError;

#[derive(StructOpt)]
pub struct MonitorOpt {
    #[structopt(long, env = "NSP_CLIENT_ADDR", default_value = "0.0.0.0")]
    pub client_addr: Ipv4Addr,

    #[structopt(long, env = "NSP_INST_ADDR")]
    pub inst_addr: Ipv4Addr,

    #[structopt(long)]
    pub legacy_port: bool,
}

/// Connects and logs every per-channel event to stdout until the operator
/// types "quit", then disconnects cleanly.
pub fn run(opt: MonitorOpt) -> Result<(), RunError> {
    let mut params = Params::new(opt.client_addr, opt.inst_addr);
    if opt.legacy_port {
        params = params.legacy_port();
    }

    let device = Device::new(params);
    device.connect().map_err(RunError::Connect)?;

    device.register_event_callback(ChannelClass::Any, Arc::new(|header, _body| {
        println!("event  chid={:<5} type={:#04x} time={}", header.chid, header.pkt_type, header.time);
    }));

    device.register_comment_callback(Arc::new(|header, _body| {
        println!("comment time={}", header.time);
    }));

    println!("monitoring; type \"quit\" to disconnect");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    device.disconnect();
    Ok(())
}
