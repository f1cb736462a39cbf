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

//! The seams between the pieces of a build, in the spirit of Build Systems a la Carte.
//!
//! A [`Rebuilder`] decides whether a target is stale and hands back the task that would bring it
//! up to date. A [`Scheduler`] decides the order targets are considered in and runs those
//! tasks. Neither knows how the other works.

use async_trait::async_trait;
use core::fmt::Debug;
use petgraph::graph::NodeIndex;

use crate::{
    build_task::CommandTaskResult, error::BuildError, graph::BuildGraph, scheduler::BuildSummary,
};

#[async_trait(?Send)]
pub trait BuildTask: Debug {
    async fn run(&self) -> CommandTaskResult;

    /// The fully substituted command line, for display.
    fn command(&self) -> &str;
}

pub trait Rebuilder {
    /// Returns `None` when `node` is up to date.
    ///
    /// Must only be called once every prerequisite of `node` has finished building.
    fn build(
        &self,
        graph: &BuildGraph,
        node: NodeIndex,
    ) -> Result<Option<Box<dyn BuildTask>>, BuildError>;
}

#[async_trait(?Send)]
pub trait Scheduler {
    async fn schedule(
        &self,
        rebuilder: &dyn Rebuilder,
        graph: &BuildGraph,
        observer: &dyn BuildObserver,
    ) -> BuildSummary;
}

/// Hooks for reporting progress. All methods default to doing nothing.
pub trait BuildObserver {
    /// Called once before any task runs with the number of targets that have actions.
    fn planned(&self, _total: usize) {}

    fn started(&self, _target: &str, _command: &str) {}

    fn finished(&self, _target: &str, _result: &CommandTaskResult) {}

    fn completed(&self, _summary: &BuildSummary) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl BuildObserver for NullObserver {}
