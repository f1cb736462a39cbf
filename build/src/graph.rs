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
    collections::{HashMap, HashSet},
    path::Path,
};

use petgraph::{graph::NodeIndex, Direction};
use sitemake_metrics::scoped_metric;
use sitemake_rules::{ActionTemplate, RuleSet, ToolPaths};
use tracing::debug;

use crate::{
    disk_interface::DiskInterface,
    error::{BuildError, ConfigError},
    scheduler::TargetState,
};

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// An existing file no rule produces.
    Leaf,
    /// A rule without an action. Only groups its prerequisites.
    Aggregate,
    Action {
        template: ActionTemplate,
        stem: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// As declared, repeats included. Used for substitution.
    pub prerequisite_names: Vec<String>,
    /// Unique, in declaration order.
    pub prerequisites: Vec<NodeIndex>,
}

impl Node {
    pub fn has_action(&self) -> bool {
        matches!(self.kind, NodeKind::Action { .. })
    }
}

// Edges point from a target to its prerequisites.
type Graph = petgraph::Graph<Node, ()>;

/// Everything reachable from the requested targets, fully resolved. Read-only once built.
#[derive(Debug)]
pub struct BuildGraph {
    graph: Graph,
    nodes: HashMap<String, NodeIndex>,
    requested: Vec<NodeIndex>,
}

impl BuildGraph {
    /// Resolves `targets` and everything they need against `rules`, failing on the first
    /// unresolvable name or dependency cycle.
    pub fn resolve<D: DiskInterface>(
        rules: &RuleSet,
        disk: &D,
        root: &Path,
        targets: &[String],
    ) -> Result<BuildGraph, BuildError> {
        scoped_metric!("resolve");
        let mut resolver = Resolver {
            rules,
            disk,
            root,
            graph: Graph::new(),
            nodes: HashMap::new(),
            states: HashMap::new(),
            stack: Vec::new(),
            active_patterns: Vec::new(),
        };
        let mut requested = Vec::with_capacity(targets.len());
        for target in targets {
            let node = resolver.visit(target, None)?;
            if !requested.contains(&node) {
                requested.push(node);
            }
        }
        Ok(BuildGraph {
            graph: resolver.graph,
            nodes: resolver.nodes,
            requested,
        })
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.nodes.get(name).copied()
    }

    pub fn requested(&self) -> &[NodeIndex] {
        &self.requested
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Targets that list `index` as a prerequisite.
    pub fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Depth first, prerequisites left to right, every node once.
    pub fn post_order(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.len());
        let mut seen = HashSet::with_capacity(self.len());
        // (node, next prerequisite to look at)
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();
        for &start in &self.requested {
            if !seen.insert(start) {
                continue;
            }
            stack.push((start, 0));
            while let Some((node, next)) = stack.pop() {
                let prerequisites = &self.graph[node].prerequisites;
                if let Some(&dep) = prerequisites.get(next) {
                    stack.push((node, next + 1));
                    if seen.insert(dep) {
                        stack.push((dep, 0));
                    }
                } else {
                    order.push(node);
                }
            }
        }
        order
    }

    /// Every tool referred to by the actions of `nodes` must be configured.
    pub fn check_tools<I>(&self, nodes: I, tools: &ToolPaths) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = NodeIndex>,
    {
        for index in nodes {
            let node = &self.graph[index];
            if let NodeKind::Action { ref template, .. } = node.kind {
                if let Some(tool) = template.tools().find(|t| tools.get(t).is_none()) {
                    return Err(ConfigError::MissingTool {
                        tool: tool.to_owned(),
                        target: node.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

struct Resolver<'a, D> {
    rules: &'a RuleSet,
    disk: &'a D,
    root: &'a Path,
    graph: Graph,
    nodes: HashMap<String, NodeIndex>,
    // Only ever holds `Resolving`. Finished nodes are removed.
    states: HashMap<NodeIndex, TargetState>,
    stack: Vec<String>,
    // Pattern rules instantiated somewhere on `stack`. Each may be used once per chain.
    active_patterns: Vec<usize>,
}

impl<'a, D: DiskInterface> Resolver<'a, D> {
    fn visit(&mut self, name: &str, dependent: Option<&str>) -> Result<NodeIndex, BuildError> {
        if let Some(&index) = self.nodes.get(name) {
            if let Some(TargetState::Resolving) = self.states.get(&index) {
                return Err(BuildError::Cycle(self.cycle_to(name)));
            }
            return Ok(index);
        }

        let mut pattern = None;
        let (kind, prerequisite_names) = match self
            .rules
            .instantiate_skipping(name, &self.active_patterns)
        {
            Some((rule, instance)) => {
                debug!(node = name, prerequisites = ?instance.prerequisites, "resolved rule");
                if self.rules.rules()[rule].is_pattern() {
                    pattern = Some(rule);
                }
                let kind = match instance.action {
                    Some(template) => NodeKind::Action {
                        template,
                        stem: instance.stem,
                    },
                    None => NodeKind::Aggregate,
                };
                (kind, instance.prerequisites)
            }
            None => {
                let path = self.root.join(name);
                let exists = self
                    .disk
                    .modified_if_exists(&path)
                    .map_err(|source| BuildError::FileSystem { path, source })?
                    .is_some();
                if !exists {
                    return Err(BuildError::NoRule {
                        target: name.to_owned(),
                        needed_by: dependent.map(str::to_owned),
                    });
                }
                (NodeKind::Leaf, vec![])
            }
        };

        let index = self.graph.add_node(Node {
            name: name.to_owned(),
            kind,
            prerequisite_names: prerequisite_names.clone(),
            prerequisites: vec![],
        });
        self.nodes.insert(name.to_owned(), index);
        self.states.insert(index, TargetState::Resolving);
        self.stack.push(name.to_owned());
        self.active_patterns.extend(pattern);

        let mut prerequisites = Vec::with_capacity(prerequisite_names.len());
        for prerequisite in &prerequisite_names {
            let dep = self.visit(prerequisite, Some(name))?;
            if !prerequisites.contains(&dep) {
                prerequisites.push(dep);
                self.graph.add_edge(index, dep, ());
            }
        }
        self.graph[index].prerequisites = prerequisites;

        if pattern.is_some() {
            self.active_patterns.pop();
        }
        self.stack.pop();
        self.states.remove(&index);
        Ok(index)
    }

    fn cycle_to(&self, name: &str) -> Vec<String> {
        let start = self
            .stack
            .iter()
            .position(|n| n == name)
            .unwrap_or_default();
        let mut cycle: Vec<String> = self.stack[start..].to_vec();
        cycle.push(name.to_owned());
        cycle
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disk_interface::testing::FakeDisk;
    use insta::assert_snapshot;
    use sitemake_rules::Declaration;
    use std::path::PathBuf;

    fn rules(toml: &str) -> RuleSet {
        Declaration::parse(toml).unwrap().rule_set().unwrap()
    }

    fn resolve(rules: &RuleSet, disk: &FakeDisk, targets: &[&str]) -> Result<BuildGraph, BuildError> {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        BuildGraph::resolve(rules, disk, &PathBuf::new(), &targets)
    }

    fn actions(graph: &BuildGraph) -> usize {
        graph
            .post_order()
            .into_iter()
            .filter(|&i| graph.node(i).has_action())
            .count()
    }

    fn names(graph: &BuildGraph, order: &[NodeIndex]) -> Vec<String> {
        order.iter().map(|&i| graph.node(i).name.clone()).collect()
    }

    const SITE: &str = r#"
[[rule]]
target = "all"
prerequisites = ["index.html", "about.html"]

[[rule]]
target = "site.xsl"
prerequisites = ["site.php"]
action = "php {MATCHED_PREREQ} > {TARGET}"

[[rule]]
target = "%.html"
prerequisites = ["%.xml", "site.xsl", "navbar.inc"]
action = "{tool:xslt} -o {TARGET} site.xsl {MATCHED_PREREQ}"
"#;

    fn site_disk() -> FakeDisk {
        FakeDisk::with(&[
            ("index.xml", 1),
            ("about.xml", 1),
            ("site.php", 1),
            ("navbar.inc", 1),
        ])
    }

    #[test]
    fn post_order_is_left_to_right() {
        let rules = rules(SITE);
        let graph = resolve(&rules, &site_disk(), &["all"]).unwrap();
        assert_eq!(
            names(&graph, &graph.post_order()),
            vec![
                "index.xml",
                "site.php",
                "site.xsl",
                "navbar.inc",
                "index.html",
                "about.xml",
                "about.html",
                "all"
            ]
        );
        assert_eq!(graph.len(), 8);
        assert_eq!(actions(&graph), 3);
    }

    #[test]
    fn shared_prerequisites_resolved_once() {
        let rules = rules(SITE);
        let graph = resolve(&rules, &site_disk(), &["index.html", "about.html", "index.html"]).unwrap();
        assert_eq!(graph.requested().len(), 2);
        let xsl = graph.index_of("site.xsl").unwrap();
        let mut dependents = names(&graph, &graph.dependents(xsl).collect::<Vec<_>>());
        dependents.sort();
        assert_eq!(dependents, vec!["about.html", "index.html"]);
    }

    #[test]
    fn node_kinds() {
        let rules = rules(SITE);
        let graph = resolve(&rules, &site_disk(), &["all"]).unwrap();
        let kind = |name: &str| graph.node(graph.index_of(name).unwrap()).kind.clone();
        assert!(matches!(kind("all"), NodeKind::Aggregate));
        assert!(matches!(kind("navbar.inc"), NodeKind::Leaf));
        match kind("index.html") {
            NodeKind::Action { stem, .. } => assert_eq!(stem.as_deref(), Some("index")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_top_level_target() {
        let rules = rules(SITE);
        let err = resolve(&rules, &site_disk(), &["missing.txt"]).unwrap_err();
        assert_snapshot!(err.to_string(), @"no rule to make target 'missing.txt'");
    }

    #[test]
    fn missing_prerequisite_names_dependent() {
        let rules = rules(SITE);
        let disk = FakeDisk::with(&[("index.xml", 1), ("site.php", 1)]);
        let err = resolve(&rules, &disk, &["index.html"]).unwrap_err();
        assert_snapshot!(
            err.to_string(),
            @"no rule to make target 'navbar.inc', needed by 'index.html'"
        );
    }

    #[test]
    fn existing_file_without_rule_is_leaf() {
        let rules = rules("");
        let graph = resolve(&rules, &FakeDisk::with(&[("README", 5)]), &["README"]).unwrap();
        assert!(matches!(graph.node(graph.requested()[0]).kind, NodeKind::Leaf));
    }

    #[test]
    fn two_node_cycle() {
        let rules = rules(
            r#"
[[rule]]
target = "A"
prerequisites = ["B"]
action = "touch {TARGET}"

[[rule]]
target = "B"
prerequisites = ["A"]
action = "touch {TARGET}"
"#,
        );
        let err = resolve(&rules, &FakeDisk::default(), &["A"]).unwrap_err();
        match err {
            BuildError::Cycle(names) => assert_eq!(names, vec!["A", "B", "A"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn self_cycle_through_pattern() {
        let rules = rules(
            r#"
[[rule]]
target = "all"
prerequisites = ["a.out"]

[[rule]]
target = "%.out"
prerequisites = ["%.out"]
"#,
        );
        let err = resolve(&rules, &FakeDisk::default(), &["all"]).unwrap_err();
        assert_snapshot!(err.to_string(), @"dependency cycle: a.out -> a.out");
    }

    #[test]
    fn pattern_rule_used_once_per_chain() {
        let rules = rules(
            r#"
[[rule]]
target = "%"
prerequisites = ["%.in"]
action = "cp {MATCHED_PREREQ} {TARGET}"
"#,
        );
        let graph = resolve(&rules, &FakeDisk::with(&[("a.in", 1)]), &["a"]).unwrap();
        assert_eq!(names(&graph, &graph.post_order()), vec!["a.in", "a"]);
        assert!(matches!(
            graph.node(graph.index_of("a.in").unwrap()).kind,
            NodeKind::Leaf
        ));

        let err = resolve(&rules, &FakeDisk::default(), &["a"]).unwrap_err();
        assert_snapshot!(err.to_string(), @"no rule to make target 'a.in', needed by 'a'");
    }

    #[test]
    fn distinct_pattern_rules_chain() {
        let rules = rules(
            r#"
[[rule]]
target = "%.html"
prerequisites = ["%.xml"]
action = "xslt {MATCHED_PREREQ} > {TARGET}"

[[rule]]
target = "%.xml"
prerequisites = ["%.md"]
action = "md2xml {MATCHED_PREREQ} > {TARGET}"
"#,
        );
        let graph = resolve(&rules, &FakeDisk::with(&[("index.md", 1)]), &["index.html"]).unwrap();
        assert_eq!(
            names(&graph, &graph.post_order()),
            vec!["index.md", "index.xml", "index.html"]
        );
        assert_eq!(actions(&graph), 2);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let rules = rules(SITE);
        assert!(resolve(&rules, &site_disk(), &["all"]).is_ok());
    }

    #[test]
    fn stat_errors_surface() {
        let rules = rules("");
        let disk = FakeDisk::default().deny("secret");
        let err = resolve(&rules, &disk, &["secret"]).unwrap_err();
        assert!(matches!(err, BuildError::FileSystem { .. }));
    }

    #[test]
    fn tools_checked_for_given_nodes() {
        let rules = rules(SITE);
        let graph = resolve(&rules, &site_disk(), &["all"]).unwrap();
        let err = graph
            .check_tools(graph.post_order(), &ToolPaths::default())
            .unwrap_err();
        assert_snapshot!(
            err.to_string(),
            @"tool 'xslt' used to build 'index.html' is not configured"
        );

        // site.xsl only needs php, which is not a declared tool.
        let xsl = graph.index_of("site.xsl").unwrap();
        assert!(graph.check_tools(vec![xsl], &ToolPaths::default()).is_ok());

        let mut tools = ToolPaths::default();
        tools.insert("xslt", "xsltproc");
        assert!(graph.check_tools(graph.post_order(), &tools).is_ok());
    }
}
