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

//! The rule model for sitemake.
//!
//! A [`RuleSet`] is assembled once from a [`Declaration`] and is read-only afterwards. Lookups
//! prefer literal rules; pattern rules are tried in declaration order and the first match wins.

use std::collections::{hash_map::Entry, HashMap};

pub mod decl;
pub mod pattern;
pub mod template;
pub mod tools;

pub use decl::{DeclError, Declaration, RuleDecl};
pub use pattern::{Bindings, Pattern, PatternError};
pub use template::{ActionTemplate, Substitutions, TemplateError};
pub use tools::ToolPaths;

/// Something that can decide whether it produces a given target name.
pub trait Matcher {
    fn matches(&self, candidate: &str) -> Option<Bindings>;
}

#[derive(Debug, Clone)]
pub struct LiteralRule {
    pub target: String,
    pub prerequisites: Vec<String>,
    pub action: Option<ActionTemplate>,
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub target: Pattern,
    pub prerequisites: Vec<Pattern>,
    pub action: Option<ActionTemplate>,
}

impl Matcher for LiteralRule {
    fn matches(&self, candidate: &str) -> Option<Bindings> {
        if self.target == candidate {
            Some(Bindings::default())
        } else {
            None
        }
    }
}

impl Matcher for PatternRule {
    fn matches(&self, candidate: &str) -> Option<Bindings> {
        self.target.matches(candidate)
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    Literal(LiteralRule),
    Pattern(PatternRule),
}

impl Matcher for Rule {
    fn matches(&self, candidate: &str) -> Option<Bindings> {
        match self {
            Rule::Literal(r) => r.matches(candidate),
            Rule::Pattern(r) => r.matches(candidate),
        }
    }
}

/// A rule bound to one concrete target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub target: String,
    pub stem: Option<String>,
    pub prerequisites: Vec<String>,
    pub action: Option<ActionTemplate>,
}

impl Rule {
    pub fn is_pattern(&self) -> bool {
        matches!(self, Rule::Pattern(_))
    }

    /// Binds the rule to `target` using what `matches` returned for it.
    pub fn instantiate(&self, target: &str, bindings: &Bindings) -> Instance {
        match self {
            Rule::Literal(r) => Instance {
                target: target.to_owned(),
                stem: None,
                prerequisites: r.prerequisites.clone(),
                action: r.action.clone(),
            },
            Rule::Pattern(r) => {
                let stem = bindings.stem().unwrap_or_default();
                Instance {
                    target: target.to_owned(),
                    stem: bindings.stem().map(str::to_owned),
                    prerequisites: r.prerequisites.iter().map(|p| p.substitute(stem)).collect(),
                    action: r.action.clone(),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    literals: HashMap<String, usize>,
    default_target: Option<String>,
}

impl RuleSet {
    /// Fails if two rules declare the same target string.
    pub fn new(rules: Vec<Rule>, default_target: Option<String>) -> Result<RuleSet, DeclError> {
        let mut literals = HashMap::new();
        let mut patterns: Vec<&Pattern> = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            match rule {
                Rule::Literal(r) => match literals.entry(r.target.clone()) {
                    Entry::Occupied(_) => return Err(DeclError::DuplicateTarget(r.target.clone())),
                    Entry::Vacant(e) => {
                        e.insert(i);
                    }
                },
                Rule::Pattern(r) => {
                    if patterns.contains(&&r.target) {
                        return Err(DeclError::DuplicateTarget(r.target.to_string()));
                    }
                    patterns.push(&r.target);
                }
            }
        }
        Ok(RuleSet {
            rules,
            literals,
            default_target,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The declared default, else the first literal rule.
    pub fn default_target(&self) -> Option<&str> {
        if let Some(t) = self.default_target.as_deref() {
            return Some(t);
        }
        self.rules.iter().find_map(|r| match r {
            Rule::Literal(r) => Some(r.target.as_str()),
            Rule::Pattern(_) => None,
        })
    }

    fn find(&self, name: &str, skip: &[usize]) -> Option<(usize, Bindings)> {
        if let Some(&i) = self.literals.get(name) {
            return Some((i, Bindings::default()));
        }
        self.rules
            .iter()
            .enumerate()
            .filter(|(i, r)| r.is_pattern() && !skip.contains(i))
            .find_map(|(i, r)| r.matches(name).map(|b| (i, b)))
    }

    pub fn resolve(&self, name: &str) -> Option<(&Rule, Bindings)> {
        self.find(name, &[])
            .map(|(i, bindings)| (&self.rules[i], bindings))
    }

    pub fn instantiate(&self, name: &str) -> Option<Instance> {
        self.instantiate_skipping(name, &[]).map(|(_, instance)| instance)
    }

    /// Like [`RuleSet::instantiate`], but the pattern rules at the indices in `skip` are
    /// passed over. Returns the index of the rule that matched.
    ///
    /// Literal rules are never skipped.
    pub fn instantiate_skipping(&self, name: &str, skip: &[usize]) -> Option<(usize, Instance)> {
        self.find(name, skip)
            .map(|(i, bindings)| (i, self.rules[i].instantiate(name, &bindings)))
    }
}
