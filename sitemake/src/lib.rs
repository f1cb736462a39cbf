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

use std::{convert::TryFrom, path::Path};

use anyhow::{self, Context};
use tracing::info;

use sitemake_builder::{
    build_targets, BuildConfig, BuildError, ConsolePrinter, ExecutionMode, FailureMode,
    SystemDiskInterface, ENGINE_ERROR_CODE,
};
use sitemake_metrics::scoped_metric;
use sitemake_rules::{Declaration, ToolPaths};

pub mod cli;

pub use cli::{Command, Config, DebugMode};

fn load(path: &Path) -> anyhow::Result<Declaration> {
    Declaration::load(path).with_context(|| format!("loading {}", path.display()))
}

fn build(config: &Config, targets: &[String]) -> anyhow::Result<()> {
    let declaration = load(&config.rules_path())?;
    let rules = {
        scoped_metric!("rules");
        declaration
            .rule_set()
            .with_context(|| format!("in {}", config.rules_path().display()))?
    };
    let tools = ToolPaths::resolve(&declaration.tools, std::env::vars_os())?;

    let mut build_config = BuildConfig::new(config.root(), tools);
    build_config.failure_mode = if config.keep_going {
        FailureMode::ContinueIndependentSiblings
    } else {
        FailureMode::StopOnFirstFailure
    };
    build_config.execution = ExecutionMode::with_jobs(config.parallelism());
    build_config.dry_run = config.dry_run;
    build_config.explain = config.debug(DebugMode::Explain);

    // Under dry run the commands are the whole point.
    let printer = ConsolePrinter::new(config.verbose || config.dry_run);
    let summary = build_targets(
        &rules,
        &build_config,
        SystemDiskInterface,
        targets,
        &printer,
    )?;
    info!(
        rebuilt = summary.rebuilt(),
        skipped = summary.skipped(),
        "build finished"
    );
    Ok(())
}

fn clean(config: &Config, patterns: &[String]) -> anyhow::Result<()> {
    let declared;
    let patterns = if patterns.is_empty() {
        declared = load(&config.rules_path())?.clean;
        &declared[..]
    } else {
        patterns
    };
    let report = sitemake_builder::clean(&SystemDiskInterface, &config.root(), patterns)?;
    println!("Cleaning... {} files.", report.removed.len());
    Ok(())
}

pub fn run(config: Config) -> anyhow::Result<()> {
    let metrics_enabled = config.debug(DebugMode::Stats);
    if metrics_enabled {
        sitemake_metrics::enable();
    }

    let result = match &config.command {
        Command::Build { targets } => build(&config, targets),
        Command::Clean { patterns } => clean(&config, patterns),
    };

    if metrics_enabled {
        eprint!("{}", sitemake_metrics::report());
    }
    result
}

/// Renders `err` with its causes, skipping causes whose text an outer message already carries.
pub fn describe(err: &anyhow::Error) -> String {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    message
}

/// The process exit status for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<BuildError>()
        .map(BuildError::exit_code)
        .unwrap_or(ENGINE_ERROR_CODE);
    u8::try_from(code).unwrap_or(ENGINE_ERROR_CODE as u8)
}

#[cfg(test)]
mod test {
    use super::*;
    use sitemake_builder::ConfigError;

    #[test]
    fn engine_errors_use_the_fixed_code() {
        let err = anyhow::Error::from(BuildError::Cycle(vec!["a".to_owned(), "a".to_owned()]));
        assert_eq!(exit_code(&err), 2);
        let err = anyhow::Error::from(BuildError::from(ConfigError::NoDefaultTarget));
        assert_eq!(exit_code(&err), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("anything else")), 2);
    }

    #[test]
    fn describe_does_not_repeat_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = anyhow::Error::from(BuildError::FileSystem {
            path: "out/index.html".into(),
            source: io,
        })
        .context("cleaning");
        assert_eq!(describe(&err), "cleaning: out/index.html: gone");
    }
}
