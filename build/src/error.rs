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

use sitemake_rules::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

use crate::build_task::CommandTaskError;

/// Exit code used when a failure has no process status of its own to report.
pub const ENGINE_ERROR_CODE: i32 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("tool '{tool}' used to build '{target}' is not configured")]
    MissingTool { tool: String, target: String },
    #[error("action for '{target}' {source}")]
    Template {
        target: String,
        #[source]
        source: TemplateError,
    },
    #[error("no targets requested and no default target declared")]
    NoDefaultTarget,
    #[error("no clean patterns given or declared")]
    NoCleanPatterns,
    #[error("invalid clean pattern '{pattern}': {source}")]
    InvalidCleanPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

fn needed_by_suffix(dependent: &Option<String>) -> String {
    match dependent {
        Some(d) => format!(", needed by '{}'", d),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("no rule to make target '{target}'{}", needed_by_suffix(.needed_by))]
    NoRule {
        target: String,
        needed_by: Option<String>,
    },
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("building '{target}' {source}")]
    ActionFailed {
        target: String,
        #[source]
        source: CommandTaskError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not start the build runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl BuildError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ActionFailed {
                source: CommandTaskError::CommandFailed(output),
                ..
            } => match output.status.code() {
                Some(code) if code != 0 => code,
                _ => ENGINE_ERROR_CODE,
            },
            _ => ENGINE_ERROR_CODE,
        }
    }

    /// The target the failure is about, if there is one.
    pub fn target(&self) -> Option<&str> {
        match self {
            BuildError::NoRule { target, .. }
            | BuildError::ActionFailed { target, .. }
            | BuildError::Config(ConfigError::MissingTool { target, .. })
            | BuildError::Config(ConfigError::Template { target, .. }) => Some(target),
            _ => None,
        }
    }
}
