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

use std::{ffi::OsString, path::PathBuf};

use thiserror::Error;

pub const DEFAULT_RULES_FILE: &str = "Sitefile.toml";

pub const HELP: &str = "\
usage: sitemake [options] [build] [targets...]
       sitemake [options] clean [patterns...]

Builds targets (default: the declared default target) from the rules in Sitefile.toml.

options:
  -C DIR   change to DIR before doing anything else
  -f FILE  specify input rule file [default=Sitefile.toml]
  -j N     run N jobs in parallel (0 means one per CPU) [default=1]
  -k       keep going until no independent target can build
  -n       dry run (don't run commands but act like they succeeded)
  -v       show all command lines while building
  -d MODE  enable debugging (use '-d list' to list modes)
  -h       show this help
  -V       print the version
";

pub const DEBUG_MODES: &str = "\
debugging modes:
  stats    print operation counts/timing info
  explain  explain what caused a command to execute
";

/// Nothing to do with rustc debug vs. release.
/// This is just ninja terminology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    List,
    Stats,
    Explain,
}

#[derive(Error, Debug)]
#[error("unknown debug setting '{0}'")]
pub struct DebugModeError(String);

impl std::str::FromStr for DebugMode {
    type Err = DebugModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(DebugMode::List),
            "stats" => Ok(DebugMode::Stats),
            "explain" => Ok(DebugMode::Explain),
            e => Err(DebugModeError(e.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Build { targets: Vec<String> },
    /// Empty `patterns` means the declared clean patterns.
    Clean { patterns: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub directory: Option<PathBuf>,
    pub rules_file: PathBuf,
    /// `None` when `-j` was not given.
    pub jobs: Option<usize>,
    pub keep_going: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub debug_modes: Vec<DebugMode>,
    pub command: Command,
}

impl Config {
    pub fn debug(&self, mode: DebugMode) -> bool {
        self.debug_modes.contains(&mode)
    }

    /// The root every target name is relative to.
    pub fn root(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn rules_path(&self) -> PathBuf {
        self.root().join(&self.rules_file)
    }

    /// `-j 0` asks for one job per CPU.
    pub fn parallelism(&self) -> usize {
        match self.jobs {
            Some(0) => num_cpus::get(),
            Some(n) => n,
            None => 1,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    Help,
    Version,
    ListDebugModes,
    Run(Config),
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Args(#[from] pico_args::Error),
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("argument is not valid UTF-8: {0:?}")]
    NotUtf8(OsString),
}

/// Parses everything after the program name.
pub fn parse(args: Vec<OsString>) -> Result<Invocation, CliError> {
    let mut args = pico_args::Arguments::from_vec(args);
    if args.contains(["-h", "--help"]) {
        return Ok(Invocation::Help);
    }
    if args.contains(["-V", "--version"]) {
        return Ok(Invocation::Version);
    }

    let directory = args.opt_value_from_str("-C")?;
    let rules_file = args
        .opt_value_from_str("-f")?
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE));
    let jobs = args.opt_value_from_str("-j")?;
    let keep_going = args.contains("-k");
    let dry_run = args.contains("-n");
    let verbose = args.contains("-v");
    let debug_modes: Vec<DebugMode> = args.values_from_str("-d")?;
    if debug_modes.contains(&DebugMode::List) {
        return Ok(Invocation::ListDebugModes);
    }

    let mut free = Vec::new();
    for arg in args.finish() {
        let arg = arg.into_string().map_err(CliError::NotUtf8)?;
        if arg.starts_with('-') && arg.len() > 1 {
            return Err(CliError::UnknownOption(arg));
        }
        free.push(arg);
    }
    let command = match free.first().map(String::as_str) {
        Some("build") => Command::Build {
            targets: free.split_off(1),
        },
        Some("clean") => Command::Clean {
            patterns: free.split_off(1),
        },
        _ => Command::Build { targets: free },
    };

    Ok(Invocation::Run(Config {
        directory,
        rules_file,
        jobs,
        keep_going,
        dry_run,
        verbose,
        debug_modes,
        command,
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_str(args: &[&str]) -> Result<Invocation, CliError> {
        parse(args.iter().map(OsString::from).collect())
    }

    fn config(args: &[&str]) -> Config {
        match parse_str(args).unwrap() {
            Invocation::Run(config) => config,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config.rules_file, PathBuf::from("Sitefile.toml"));
        assert_eq!(config.root(), PathBuf::from("."));
        assert_eq!(config.parallelism(), 1);
        assert!(!config.keep_going);
        assert_eq!(config.command, Command::Build { targets: vec![] });
    }

    #[test]
    fn build_is_the_default_subcommand() {
        assert_eq!(
            config(&["index.html", "about.html"]).command,
            Command::Build {
                targets: vec!["index.html".to_owned(), "about.html".to_owned()]
            }
        );
        assert_eq!(
            config(&["build", "index.html"]).command,
            Command::Build {
                targets: vec!["index.html".to_owned()]
            }
        );
    }

    #[test]
    fn flags() {
        let config = config(&[
            "-C", "site", "-f", "rules.toml", "-j", "4", "-k", "-n", "-v", "-d", "stats", "-d",
            "explain", "clean", "*.html",
        ]);
        assert_eq!(config.rules_path(), PathBuf::from("site/rules.toml"));
        assert_eq!(config.parallelism(), 4);
        assert!(config.keep_going && config.dry_run && config.verbose);
        assert!(config.debug(DebugMode::Stats));
        assert!(config.debug(DebugMode::Explain));
        assert_eq!(
            config.command,
            Command::Clean {
                patterns: vec!["*.html".to_owned()]
            }
        );
    }

    #[test]
    fn zero_jobs_means_every_cpu() {
        assert_eq!(config(&["-j", "0"]).parallelism(), num_cpus::get());
    }

    #[test]
    fn help_and_version() {
        assert_eq!(parse_str(&["-h"]).unwrap(), Invocation::Help);
        assert_eq!(parse_str(&["--version"]).unwrap(), Invocation::Version);
        assert_eq!(
            parse_str(&["-d", "list"]).unwrap(),
            Invocation::ListDebugModes
        );
    }

    #[test]
    fn rejects_unknown_things() {
        assert!(matches!(
            parse_str(&["-x"]),
            Err(CliError::UnknownOption(o)) if o == "-x"
        ));
        let err = parse_str(&["-d", "trace"]).unwrap_err();
        assert!(err.to_string().contains("unknown debug setting 'trace'"));
        assert!(parse_str(&["-j", "many"]).is_err());
    }
}
