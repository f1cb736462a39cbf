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

use std::{
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Output, Stdio},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::interface::BuildTask;

#[derive(Error, Debug)]
pub enum CommandTaskError {
    #[error("could not start: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("failed with {}", .0.status)]
    CommandFailed(Output),
}

impl CommandTaskError {
    /// The tool's stderr, if it ran far enough to produce any.
    pub fn stderr(&self) -> Option<&[u8]> {
        match self {
            CommandTaskError::CommandFailed(output) => Some(&output.stderr),
            CommandTaskError::SpawnFailed(_) => None,
        }
    }
}

pub type CommandTaskResult = Result<Output, CommandTaskError>;

fn empty_output() -> Output {
    Output {
        status: ExitStatusExt::from_raw(0),
        stdout: vec![],
        stderr: vec![],
    }
}

/// Runs one action through `/bin/sh` in the build root.
#[derive(Debug)]
pub struct CommandTask {
    root: PathBuf,
    target: String,
    command: String,
}

impl CommandTask {
    pub fn new(root: PathBuf, target: String, command: String) -> CommandTask {
        CommandTask {
            root,
            target,
            command,
        }
    }

    pub async fn run_command(&self) -> CommandTaskResult {
        // Tools are not expected to create the directory they write into.
        if let Some(dir) = self.root.join(&self.target).parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(CommandTaskError::CommandFailed(output));
        }
        Ok(output)
    }
}

#[async_trait(?Send)]
impl BuildTask for CommandTask {
    async fn run(&self) -> CommandTaskResult {
        self.run_command().await
    }

    fn command(&self) -> &str {
        &self.command
    }
}

/// Stands in for a `CommandTask` under `--dry-run`.
#[derive(Debug)]
pub struct DryRunTask {
    command: String,
}

impl DryRunTask {
    pub fn new(command: String) -> DryRunTask {
        DryRunTask { command }
    }
}

#[async_trait(?Send)]
impl BuildTask for DryRunTask {
    async fn run(&self) -> CommandTaskResult {
        Ok(empty_output())
    }

    fn command(&self) -> &str {
        &self.command
    }
}
