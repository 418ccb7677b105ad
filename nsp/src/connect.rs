use std::net::Ipv4Addr;

use structopt::StructOpt;

use nsp_device::{Device, Params};

use crate::RunError;

#[derive(StructOpt)]
pub struct ConnectOpt {
    /// Local address to bind the UDP socket to.
    #[structopt(long, env = "NSP_CLIENT_ADDR", default_value = "0.0.0.0")]
    pub client_addr: Ipv4Addr,

    /// Address of the instrument to connect to.
    #[structopt(long, env = "NSP_INST_ADDR")]
    pub inst_addr: Ipv4Addr,

    /// Use the legacy (pre-Gemini) instrument port instead of the default.
    #[structopt(long)]
    pub legacy_port: bool,
}

/// Connects to an instrument, prints what the configuration mirror ended up
/// with once the handshake settles, and disconnects.
pub fn run(opt: ConnectOpt) -> Result<(), RunError> {
    let mut params = Params::new(opt.client_addr, opt.inst_addr);
    if opt.legacy_port {
        params = params.legacy_port();
    }

    let device = Device::new(params);
    device.connect().map_err(RunError::Connect)?;

    let snapshot = device.snapshot();
    println!("run level:     {:?}", snapshot.run_level);
    println!("instrument:    {}", snapshot.instrument);
    println!("channels seen: {}", snapshot.channel_count);
    println!("proc channels: {}", snapshot.proc_chans);
    if let Some(sysfreq) = snapshot.sysfreq {
        println!("sysfreq:       {sysfreq} Hz");
    }

    device.disconnect();
    Ok(())
}
