// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: rendezvousd entrypoint: load config, run the registry self-check, report via exit code

use std::path::PathBuf;
use std::process::ExitCode;

use rendezvousd::DaemonConfig;

fn main() -> ExitCode {
    env_logger::init();
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match DaemonConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("rendezvousd: {err}");
            return ExitCode::from(2);
        }
    };
    match rendezvousd::run_selfcheck(&config) {
        Ok(()) => {
            println!("rendezvousd: ready");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("rendezvousd: {err}");
            ExitCode::FAILURE
        }
    }
}
