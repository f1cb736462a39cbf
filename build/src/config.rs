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

use std::path::PathBuf;

use sitemake_rules::ToolPaths;

use crate::scheduler::FailureMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One action at a time, in post-order.
    Sequential,
    /// Independent subtrees run concurrently, at most `jobs` actions at once.
    Parallel { jobs: usize },
}

impl ExecutionMode {
    /// `jobs` of 0 or 1 means sequential.
    pub fn with_jobs(jobs: usize) -> ExecutionMode {
        if jobs > 1 {
            ExecutionMode::Parallel { jobs }
        } else {
            ExecutionMode::Sequential
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// Everything a build needs to know about its environment. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Target names are relative to this directory, and actions run in it.
    pub root: PathBuf,
    pub tools: ToolPaths,
    pub failure_mode: FailureMode,
    pub execution: ExecutionMode,
    pub dry_run: bool,
    /// Log why each stale target is stale at `info` level.
    pub explain: bool,
}

impl BuildConfig {
    pub fn new<P: Into<PathBuf>>(root: P, tools: ToolPaths) -> BuildConfig {
        BuildConfig {
            root: root.into(),
            tools,
            failure_mode: FailureMode::default(),
            execution: ExecutionMode::default(),
            dry_run: false,
            explain: false,
        }
    }
}
