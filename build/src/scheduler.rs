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

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::{
    future::{FutureExt, LocalBoxFuture},
    stream::{FuturesUnordered, StreamExt},
};
use petgraph::graph::NodeIndex;
use tracing::{debug, info, warn};

use crate::{
    build_task::CommandTaskResult,
    error::BuildError,
    graph::BuildGraph,
    interface::{BuildObserver, BuildTask, Rebuilder, Scheduler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    StopOnFirstFailure,
    /// Keep building everything that does not depend on a failed target.
    ContinueIndependentSiblings,
}

impl Default for FailureMode {
    fn default() -> Self {
        FailureMode::StopOnFirstFailure
    }
}

/// Where a target is in its lifecycle. Targets move strictly left to right:
/// `Unvisited -> Resolving -> Evaluating -> {Skipped | Rebuilt | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Unvisited,
    Resolving,
    Evaluating,
    Skipped,
    Rebuilt,
    Failed,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    states: HashMap<String, TargetState>,
    failures: Vec<BuildError>,
    rebuilt: usize,
    skipped: usize,
    failed: usize,
}

impl BuildSummary {
    pub fn state(&self, target: &str) -> TargetState {
        self.states
            .get(target)
            .copied()
            .unwrap_or(TargetState::Unvisited)
    }

    /// Targets whose action ran (or would have, under dry run).
    pub fn rebuilt(&self) -> usize {
        self.rebuilt
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Includes targets that failed only because a prerequisite did.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Root causes, in the order they happened.
    pub fn failures(&self) -> &[BuildError] {
        &self.failures
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The first failure, if any.
    pub fn into_result(mut self) -> Result<BuildSummary, BuildError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures.remove(0))
        }
    }

    fn record(&mut self, target: &str, state: TargetState) {
        match state {
            TargetState::Skipped => self.skipped += 1,
            TargetState::Rebuilt => self.rebuilt += 1,
            TargetState::Failed => self.failed += 1,
            _ => {}
        }
        self.states.insert(target.to_owned(), state);
    }

    fn fail(&mut self, target: &str, error: BuildError) {
        self.record(target, TargetState::Failed);
        self.failures.push(error);
    }

    fn prerequisite_failed(&self, graph: &BuildGraph, index: NodeIndex) -> bool {
        graph
            .node(index)
            .prerequisites
            .iter()
            .any(|&p| self.state(&graph.node(p).name) == TargetState::Failed)
    }
}

enum Step {
    Done,
    /// A prerequisite failed, so this was never evaluated.
    Blocked,
    Failed,
    Run(Box<dyn BuildTask>),
}

fn evaluate(
    rebuilder: &dyn Rebuilder,
    graph: &BuildGraph,
    index: NodeIndex,
    summary: &mut BuildSummary,
) -> Step {
    let name = &graph.node(index).name;
    if summary.prerequisite_failed(graph, index) {
        debug!(node = %name, "prerequisite failed");
        summary.record(name, TargetState::Failed);
        return Step::Blocked;
    }
    summary.record(name, TargetState::Evaluating);
    match rebuilder.build(graph, index) {
        Ok(None) => {
            summary.record(name, TargetState::Skipped);
            Step::Done
        }
        Ok(Some(task)) => Step::Run(task),
        Err(e) => {
            summary.fail(name, e);
            Step::Failed
        }
    }
}

fn finish(
    name: &str,
    result: CommandTaskResult,
    mode: FailureMode,
    summary: &mut BuildSummary,
) -> bool {
    match result {
        Ok(_) => {
            info!(node = %name, "built");
            summary.record(name, TargetState::Rebuilt);
            true
        }
        Err(source) => {
            if mode == FailureMode::ContinueIndependentSiblings {
                warn!("building '{}' {}, continuing", name, source);
            }
            summary.fail(
                name,
                BuildError::ActionFailed {
                    target: name.to_owned(),
                    source,
                },
            );
            false
        }
    }
}

/// Builds one target at a time, prerequisites depth first and left to right.
#[derive(Debug, Default)]
pub struct SequentialScheduler {
    mode: FailureMode,
}

impl SequentialScheduler {
    pub fn new(mode: FailureMode) -> Self {
        SequentialScheduler { mode }
    }
}

#[async_trait(?Send)]
impl Scheduler for SequentialScheduler {
    async fn schedule(
        &self,
        rebuilder: &dyn Rebuilder,
        graph: &BuildGraph,
        observer: &dyn BuildObserver,
    ) -> BuildSummary {
        let mut summary = BuildSummary::default();
        for index in graph.post_order() {
            let ok = match evaluate(rebuilder, graph, index, &mut summary) {
                Step::Done | Step::Blocked => true,
                Step::Failed => false,
                Step::Run(task) => {
                    let name = &graph.node(index).name;
                    observer.started(name, task.command());
                    let result = task.run().await;
                    observer.finished(name, &result);
                    finish(name, result, self.mode, &mut summary)
                }
            };
            if !ok && self.mode == FailureMode::StopOnFirstFailure {
                break;
            }
        }
        observer.completed(&summary);
        summary
    }
}

/// Runs up to `jobs` actions at once. A target starts only once all its prerequisites are done.
#[derive(Debug)]
pub struct ParallelTopoScheduler {
    jobs: usize,
    mode: FailureMode,
}

impl ParallelTopoScheduler {
    pub fn new(jobs: usize, mode: FailureMode) -> Self {
        ParallelTopoScheduler {
            jobs: jobs.max(1),
            mode,
        }
    }
}

type Running = LocalBoxFuture<'static, (NodeIndex, CommandTaskResult)>;

fn release(
    graph: &BuildGraph,
    index: NodeIndex,
    pending: &mut HashMap<NodeIndex, usize>,
    ready: &mut VecDeque<NodeIndex>,
) {
    for dependent in graph.dependents(index) {
        if let Some(count) = pending.get_mut(&dependent) {
            *count -= 1;
            if *count == 0 {
                ready.push_back(dependent);
            }
        }
    }
}

#[async_trait(?Send)]
impl Scheduler for ParallelTopoScheduler {
    async fn schedule(
        &self,
        rebuilder: &dyn Rebuilder,
        graph: &BuildGraph,
        observer: &dyn BuildObserver,
    ) -> BuildSummary {
        let mut summary = BuildSummary::default();
        let order = graph.post_order();
        let mut pending: HashMap<NodeIndex, usize> = order
            .iter()
            .map(|&i| (i, graph.node(i).prerequisites.len()))
            .collect();
        // Seeded in post-order so independent leaves start in a familiar order.
        let mut ready: VecDeque<NodeIndex> =
            order.iter().copied().filter(|i| pending[i] == 0).collect();
        let mut running: FuturesUnordered<Running> = FuturesUnordered::new();
        let mut stopped = false;

        loop {
            while !stopped && running.len() < self.jobs {
                let index = match ready.pop_front() {
                    Some(index) => index,
                    None => break,
                };
                match evaluate(rebuilder, graph, index, &mut summary) {
                    Step::Done | Step::Blocked => {
                        release(graph, index, &mut pending, &mut ready);
                    }
                    Step::Failed => {
                        stopped = self.mode == FailureMode::StopOnFirstFailure;
                        release(graph, index, &mut pending, &mut ready);
                    }
                    Step::Run(task) => {
                        observer.started(&graph.node(index).name, task.command());
                        running.push(
                            async move {
                                let result = task.run().await;
                                (index, result)
                            }
                            .boxed_local(),
                        );
                    }
                }
            }

            let (index, result) = match running.next().await {
                Some(done) => done,
                None => break,
            };
            let name = &graph.node(index).name;
            observer.finished(name, &result);
            if !finish(name, result, self.mode, &mut summary)
                && self.mode == FailureMode::StopOnFirstFailure
            {
                stopped = true;
            }
            release(graph, index, &mut pending, &mut ready);
        }
        observer.completed(&summary);
        summary
    }
}
