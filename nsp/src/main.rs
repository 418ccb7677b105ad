mod connect;
mod monitor;

use std::process::ExitCode;

use structopt::StructOpt;

#[derive(StructOpt)]
enum Opt {
    Connect(connect::ConnectOpt),
    Monitor(monitor::MonitorOpt),
}

#[derive(Debug)]
pub enum RunError {
    Connect(nsp_device::ConnectError),
    Config(nsp_device::ConfigError),
}

fn main() -> Result<(), ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let result = match opt {
        Opt::Connect(opt) => connect::run(opt),
        Opt::Monitor(opt) => monitor::run(opt),
    };

    result.map_err(|err| {
        eprintln!("error: {err:?}");
        ExitCode::FAILURE
    })
}
