//! Summary: Process entry point for the meridiandb server.
//! Copyright (c) Meridian. All rights reserved.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use log::error;

use meridian::{Engine, server};

/// Default listen address, matching the port the protocol has always used.
const DEFAULT_ADDR: &str = "0.0.0.0:3456";

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| ".".to_string());
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());

    match run(&dir, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(dir: &str, addr: &str) -> meridian::Result<()> {
    let engine = Arc::new(Engine::open(dir)?);
    server::serve(engine, addr)
}
