#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use clap::Parser;
use pwmod_cli::PwmodPasswdParser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let opt = PwmodPasswdParser::parse();

    let config = match opt.commands.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    sketching::start_logging(opt.commands.log_level(config.as_ref()));

    match opt.commands.exec(config.as_ref()) {
        Ok(out) => {
            println!("{}", out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
