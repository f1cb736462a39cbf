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

//! Action command templates.
//!
//! A template is plain shell text with `{PLACEHOLDER}` references:
//!
//! | placeholder        | expands to                                           |
//! |--------------------|------------------------------------------------------|
//! | `{TARGET}`         | the target being built                               |
//! | `{MATCHED_PREREQ}` | the first prerequisite                               |
//! | `{ALL_PREREQS}`    | every prerequisite, space separated, without repeats |
//! | `{STEM}`           | what `%` matched, empty for literal rules            |
//! | `{tool:NAME}`      | the configured path of tool `NAME`                   |
//!
//! `{{` and `}}` are literal braces. Paths are shell quoted when substituted.

use shell_quote::{QuoteRefExt, Sh};
use thiserror::Error;

use crate::tools::ToolPaths;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),
    #[error("tool '{0}' is not configured")]
    MissingTool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Literal(String),
    Target,
    MatchedPrereq,
    AllPrereqs,
    Stem,
    Tool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    source: String,
    terms: Vec<Term>,
}

/// Everything a template may refer to when rendered for one target.
#[derive(Debug, Clone, Copy)]
pub struct Substitutions<'a> {
    pub target: &'a str,
    pub prerequisites: &'a [String],
    pub stem: Option<&'a str>,
    pub tools: &'a ToolPaths,
}

fn quote(s: &str) -> String {
    let bytes: Vec<u8> = s.quoted(Sh);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).into_owned(),
    }
}

fn placeholder(name: &str) -> Result<Term, TemplateError> {
    Ok(match name {
        "TARGET" => Term::Target,
        "MATCHED_PREREQ" => Term::MatchedPrereq,
        "ALL_PREREQS" => Term::AllPrereqs,
        "STEM" => Term::Stem,
        _ => match name.strip_prefix("tool:") {
            Some(tool) if !tool.is_empty() => Term::Tool(tool.to_owned()),
            _ => return Err(TemplateError::UnknownPlaceholder(name.to_owned())),
        },
    })
}

impl ActionTemplate {
    pub fn parse(source: &str) -> Result<ActionTemplate, TemplateError> {
        let mut terms = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();
        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                '{' => {
                    let start = pos + 1;
                    let end = loop {
                        match chars.next() {
                            Some((end, '}')) => break end,
                            Some(_) => {}
                            None => return Err(TemplateError::Unterminated(pos)),
                        }
                    };
                    if !literal.is_empty() {
                        terms.push(Term::Literal(std::mem::take(&mut literal)));
                    }
                    terms.push(placeholder(&source[start..end])?);
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            terms.push(Term::Literal(literal));
        }
        Ok(ActionTemplate {
            source: source.to_owned(),
            terms,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of every tool the template refers to.
    pub fn tools(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match t {
            Term::Tool(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn render(&self, subs: &Substitutions<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for term in &self.terms {
            match term {
                Term::Literal(s) => out.push_str(s),
                Term::Target => out.push_str(&quote(subs.target)),
                Term::MatchedPrereq => {
                    if let Some(first) = subs.prerequisites.first() {
                        out.push_str(&quote(first));
                    }
                }
                Term::AllPrereqs => {
                    let mut seen: Vec<&str> = Vec::with_capacity(subs.prerequisites.len());
                    for p in subs.prerequisites {
                        if seen.contains(&p.as_str()) {
                            continue;
                        }
                        if !seen.is_empty() {
                            out.push(' ');
                        }
                        seen.push(p);
                        out.push_str(&quote(p));
                    }
                }
                Term::Stem => {
                    if let Some(stem) = subs.stem {
                        out.push_str(&quote(stem));
                    }
                }
                Term::Tool(name) => {
                    let path = subs
                        .tools
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingTool(name.clone()))?;
                    out.push_str(&quote(path));
                }
            }
        }
        Ok(out)
    }
}
