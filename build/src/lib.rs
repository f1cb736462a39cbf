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

//! Resolves requested targets against a rule set, decides what is stale from file modification
//! times and runs the actions needed to bring everything up to date.

use sitemake_metrics::scoped_metric;
use sitemake_rules::RuleSet;
use tracing::debug;

pub mod build_task;
pub mod clean;
pub mod config;
pub mod disk_interface;
pub mod error;
pub mod graph;
pub mod interface;
pub mod printer;
pub mod rebuilder;
pub mod scheduler;


pub use clean::{clean, CleanReport};
pub use config::{BuildConfig, ExecutionMode};
pub use disk_interface::{DiskInterface, SystemDiskInterface};
pub use error::{BuildError, ConfigError, ENGINE_ERROR_CODE};
pub use graph::BuildGraph;
pub use interface::{BuildObserver, NullObserver};
pub use printer::ConsolePrinter;
pub use rebuilder::{MTimeRebuilder, MTimeState};
pub use scheduler::{
    BuildSummary, FailureMode, ParallelTopoScheduler, SequentialScheduler, TargetState,
};

use interface::Scheduler;

/// Builds `targets`, or the rule set's default target when none are given.
///
/// The whole plan is resolved and checked for cycles before any action runs. The actions that
/// will run are worked out up front too, and every tool they use must be configured.
pub fn build_targets<D: DiskInterface>(
    rules: &RuleSet,
    config: &BuildConfig,
    disk: D,
    targets: &[String],
    observer: &dyn BuildObserver,
) -> Result<BuildSummary, BuildError> {
    let defaulted;
    let targets = if targets.is_empty() {
        let default = rules
            .default_target()
            .ok_or(ConfigError::NoDefaultTarget)?;
        debug!(node = default, "building default target");
        defaulted = [default.to_owned()];
        &defaulted[..]
    } else {
        targets
    };

    let graph = BuildGraph::resolve(rules, &disk, &config.root, targets)?;
    let stale = MTimeRebuilder::new(MTimeState::new(&disk, config.root.clone()), config)
        .stale_actions(&graph)?;
    graph.check_tools(stale.iter().copied(), &config.tools)?;

    let rebuilder = MTimeRebuilder::new(MTimeState::new(disk, config.root.clone()), config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BuildError::Runtime)?;

    observer.planned(stale.len());
    let summary = {
        scoped_metric!("build");
        match config.execution {
            ExecutionMode::Sequential => runtime.block_on(
                SequentialScheduler::new(config.failure_mode).schedule(&rebuilder, &graph, observer),
            ),
            ExecutionMode::Parallel { jobs } => runtime.block_on(
                ParallelTopoScheduler::new(jobs, config.failure_mode)
                    .schedule(&rebuilder, &graph, observer),
            ),
        }
    };
    summary.into_result()
}
