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
    cell::RefCell,
    collections::HashMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
    time::SystemTime,
};

use petgraph::graph::NodeIndex;
use sitemake_rules::{ActionTemplate, Substitutions, TemplateError};
use tracing::{debug, info};

use crate::{
    build_task::{CommandTask, DryRunTask},
    config::BuildConfig,
    disk_interface::DiskInterface,
    error::{BuildError, ConfigError},
    graph::{BuildGraph, Node, NodeKind},
    interface::{BuildTask, Rebuilder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dirtiness {
    /// Evaluated this invocation and found up to date. Only aggregates end up here, since they
    /// have no timestamp of their own.
    Clean,
    /// Rebuilt (or scheduled to be) this invocation.
    Dirty,
    DoesNotExist,
    Modified(SystemTime),
}

/// Where the rebuilder gets timestamps from, and where it records what it decided.
pub trait MTimeStateI {
    fn modified(&self, name: &str) -> std::io::Result<Dirtiness>;

    fn mark_dirty(&self, name: &str, dirty: bool);
}

/// Stats each name at most once per invocation.
#[derive(Debug)]
pub struct MTimeState<D> {
    disk: D,
    root: PathBuf,
    cache: RefCell<HashMap<String, Dirtiness>>,
}

impl<D: DiskInterface> MTimeState<D> {
    pub fn new<P: Into<PathBuf>>(disk: D, root: P) -> Self {
        MTimeState {
            disk,
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl<D: DiskInterface> MTimeStateI for MTimeState<D> {
    fn modified(&self, name: &str) -> std::io::Result<Dirtiness> {
        if let Some(d) = self.cache.borrow().get(name) {
            return Ok(*d);
        }
        let dirtiness = match self.disk.modified_if_exists(self.root.join(name))? {
            Some(t) => Dirtiness::Modified(t),
            None => Dirtiness::DoesNotExist,
        };
        self.cache.borrow_mut().insert(name.to_owned(), dirtiness);
        Ok(dirtiness)
    }

    fn mark_dirty(&self, name: &str, dirty: bool) {
        let d = if dirty {
            Dirtiness::Dirty
        } else {
            Dirtiness::Clean
        };
        self.cache.borrow_mut().insert(name.to_owned(), d);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Missing,
    MissingPrerequisite(String),
    PrerequisiteRebuilt(String),
    Newer(String),
}

impl Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Missing => write!(f, "output does not exist"),
            StaleReason::MissingPrerequisite(p) => write!(f, "prerequisite '{}' does not exist", p),
            StaleReason::PrerequisiteRebuilt(p) => write!(f, "prerequisite '{}' was rebuilt", p),
            StaleReason::Newer(p) => write!(f, "prerequisite '{}' is newer", p),
        }
    }
}

/// Decides staleness purely from modification times, like make.
#[derive(Debug)]
pub struct MTimeRebuilder<'a, S> {
    state: S,
    config: &'a BuildConfig,
}

impl<'a, S: MTimeStateI> MTimeRebuilder<'a, S> {
    pub fn new(state: S, config: &'a BuildConfig) -> Self {
        MTimeRebuilder { state, config }
    }

    fn modified(&self, name: &str) -> Result<Dirtiness, BuildError> {
        self.state
            .modified(name)
            .map_err(|source| BuildError::FileSystem {
                path: self.config.root.join(name),
                source,
            })
    }

    fn prerequisite_reason(
        &self,
        name: &str,
        target: Option<SystemTime>,
    ) -> Result<Option<StaleReason>, BuildError> {
        Ok(match self.modified(name)? {
            Dirtiness::Clean => None,
            Dirtiness::Dirty => Some(StaleReason::PrerequisiteRebuilt(name.to_owned())),
            Dirtiness::DoesNotExist => Some(StaleReason::MissingPrerequisite(name.to_owned())),
            Dirtiness::Modified(t) => match target {
                Some(target) if t > target => Some(StaleReason::Newer(name.to_owned())),
                _ => None,
            },
        })
    }

    /// The first reason `node` needs rebuilding, if any.
    ///
    /// Aggregates have no timestamp, so only rebuilt or missing prerequisites make them stale.
    pub fn stale_reason(
        &self,
        graph: &BuildGraph,
        node: &Node,
    ) -> Result<Option<StaleReason>, BuildError> {
        let target = match node.kind {
            NodeKind::Leaf => return Ok(None),
            NodeKind::Aggregate => None,
            NodeKind::Action { .. } => match self.modified(&node.name)? {
                Dirtiness::Modified(t) => Some(t),
                // A target someone else already marked dirty is as good as missing.
                Dirtiness::Dirty | Dirtiness::DoesNotExist => return Ok(Some(StaleReason::Missing)),
                Dirtiness::Clean => None,
            },
        };
        for &prerequisite in &node.prerequisites {
            let name = &graph.node(prerequisite).name;
            if let Some(reason) = self.prerequisite_reason(name, target)? {
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    pub fn needs_rebuild(&self, graph: &BuildGraph, node: &Node) -> Result<bool, BuildError> {
        Ok(self.stale_reason(graph, node)?.is_some())
    }

    /// The action nodes a build of `graph` would run, in post order, assuming every action
    /// succeeds. Records its decisions in this rebuilder's state, so use a fresh one.
    pub fn stale_actions(&self, graph: &BuildGraph) -> Result<Vec<NodeIndex>, BuildError> {
        let mut stale = Vec::new();
        for index in graph.post_order() {
            let node = graph.node(index);
            let dirty = match node.kind {
                NodeKind::Leaf => continue,
                _ => self.needs_rebuild(graph, node)?,
            };
            if node.has_action() {
                if dirty {
                    self.state.mark_dirty(&node.name, true);
                    stale.push(index);
                }
            } else {
                self.state.mark_dirty(&node.name, dirty);
            }
        }
        Ok(stale)
    }

    fn render(
        &self,
        node: &Node,
        template: &ActionTemplate,
        stem: Option<&str>,
    ) -> Result<String, BuildError> {
        let subs = Substitutions {
            target: &node.name,
            prerequisites: &node.prerequisite_names,
            stem,
            tools: &self.config.tools,
        };
        template.render(&subs).map_err(|err| {
            let target = node.name.clone();
            let err = match err {
                TemplateError::MissingTool(tool) => ConfigError::MissingTool { tool, target },
                source => ConfigError::Template { target, source },
            };
            BuildError::from(err)
        })
    }

    fn explain(&self, name: &str, reason: &StaleReason) {
        if self.config.explain {
            info!("{} is stale: {}", name, reason);
        } else {
            debug!(node = name, %reason, "stale");
        }
    }

    fn root(&self) -> &Path {
        &self.config.root
    }
}

impl<'a, S: MTimeStateI> Rebuilder for MTimeRebuilder<'a, S> {
    fn build(
        &self,
        graph: &BuildGraph,
        index: NodeIndex,
    ) -> Result<Option<Box<dyn BuildTask>>, BuildError> {
        let node = graph.node(index);
        let reason = self.stale_reason(graph, node)?;
        let (template, stem) = match &node.kind {
            NodeKind::Leaf => return Ok(None),
            NodeKind::Aggregate => {
                if let Some(reason) = &reason {
                    self.explain(&node.name, reason);
                }
                self.state.mark_dirty(&node.name, reason.is_some());
                return Ok(None);
            }
            NodeKind::Action { template, stem } => (template, stem),
        };

        let reason = match reason {
            Some(reason) => reason,
            None => {
                debug!(node = %node.name, "up to date");
                return Ok(None);
            }
        };
        self.explain(&node.name, &reason);

        let command = self.render(node, template, stem.as_deref())?;
        self.state.mark_dirty(&node.name, true);
        if self.config.dry_run {
            Ok(Some(Box::new(DryRunTask::new(command))))
        } else {
            Ok(Some(Box::new(CommandTask::new(
                self.root().to_owned(),
                node.name.clone(),
                command,
            ))))
        }
    }
}
