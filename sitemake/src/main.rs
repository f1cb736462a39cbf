/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::process::ExitCode;

use sitemake::{
    cli::{self, Invocation, DEBUG_MODES, HELP},
    describe, exit_code, run, Config, DebugMode,
};
use sitemake_builder::ENGINE_ERROR_CODE;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SITEMAKE_LOG";

fn init_logging(config: &Config) {
    let fallback = if config.verbose {
        "debug"
    } else if config.debug(DebugMode::Explain) {
        "warn,sitemake_builder::rebuilder=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let config = match cli::parse(std::env::args_os().skip(1).collect()) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print!("{}", HELP);
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::Version) => {
            println!("sitemake {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::ListDebugModes) => {
            print!("{}", DEBUG_MODES);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("sitemake: {}\n\n{}", e, HELP);
            return ExitCode::from(ENGINE_ERROR_CODE as u8);
        }
    };

    init_logging(&config);
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sitemake: error: {}", describe(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}
