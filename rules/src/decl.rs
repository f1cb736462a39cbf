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

//! The on-disk rule declaration format (a `Sitefile.toml`).

use serde::Deserialize;
use sitemake_metrics::scoped_metric;
use std::{collections::BTreeMap, path::Path, path::PathBuf};
use thiserror::Error;

use crate::{
    ActionTemplate, LiteralRule, Pattern, PatternError, PatternRule, Rule, RuleSet, TemplateError,
};

#[derive(Error, Debug)]
pub enum DeclError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Syntax(#[from] toml::de::Error),
    #[error("rule '{target}': {source}")]
    Pattern {
        target: String,
        #[source]
        source: PatternError,
    },
    #[error("rule '{target}': {source}")]
    Template {
        target: String,
        #[source]
        source: TemplateError,
    },
    #[error("duplicate rule for target: {0}")]
    DuplicateTarget(String),
    #[error("environment variable {0} is not valid UTF-8")]
    NonUnicodeTool(String),
    #[error("rule '{target}': prerequisite '{prerequisite}' has a '%' but the target does not")]
    UnboundWildcard {
        target: String,
        prerequisite: String,
    },
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleDecl {
    pub target: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    #[serde(default)]
    pub default: Option<String>,
    /// Patterns `clean` removes when none are given on the command line.
    #[serde(default)]
    pub clean: Vec<String>,
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDecl>,
}

impl RuleDecl {
    fn to_rule(&self) -> Result<Rule, DeclError> {
        let pattern_err = |source| DeclError::Pattern {
            target: self.target.clone(),
            source,
        };
        let target = Pattern::parse(&self.target).map_err(pattern_err)?;
        let prerequisites = self
            .prerequisites
            .iter()
            .map(|p| Pattern::parse(p).map_err(pattern_err))
            .collect::<Result<Vec<Pattern>, DeclError>>()?;
        let action = self
            .action
            .as_deref()
            .map(ActionTemplate::parse)
            .transpose()
            .map_err(|source| DeclError::Template {
                target: self.target.clone(),
                source,
            })?;

        Ok(match target {
            Pattern::Literal(target) => {
                let prerequisites = prerequisites
                    .into_iter()
                    .map(|p| match p {
                        Pattern::Literal(name) => Ok(name),
                        wildcard => Err(DeclError::UnboundWildcard {
                            target: target.clone(),
                            prerequisite: wildcard.to_string(),
                        }),
                    })
                    .collect::<Result<Vec<String>, DeclError>>()?;
                Rule::Literal(LiteralRule {
                    target,
                    prerequisites,
                    action,
                })
            }
            target => Rule::Pattern(PatternRule {
                target,
                prerequisites,
                action,
            }),
        })
    }
}

impl Declaration {
    pub fn parse(source: &str) -> Result<Declaration, DeclError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Declaration, DeclError> {
        scoped_metric!("load");
        let source = std::fs::read_to_string(path).map_err(|source| DeclError::Io {
            path: path.to_owned(),
            source,
        })?;
        Declaration::parse(&source)
    }

    pub fn rule_set(&self) -> Result<RuleSet, DeclError> {
        let rules = self
            .rules
            .iter()
            .map(RuleDecl::to_rule)
            .collect::<Result<Vec<Rule>, DeclError>>()?;
        RuleSet::new(rules, self.default.clone())
    }
}
