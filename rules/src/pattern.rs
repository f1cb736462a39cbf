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

use std::{fmt::Display, str::FromStr};
use thiserror::Error;

pub const WILDCARD: char = '%';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty target name")]
    Empty,
    #[error("'{0}' has more than one '%'")]
    MultipleWildcards(String),
}

/// What a successful match bound. Literal matches bind nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    stem: Option<String>,
}

impl Bindings {
    pub fn with_stem<S: Into<String>>(stem: S) -> Self {
        Bindings {
            stem: Some(stem.into()),
        }
    }

    pub fn stem(&self) -> Option<&str> {
        self.stem.as_deref()
    }
}

/// A target or prerequisite name, possibly containing a single `%` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    Literal(String),
    Wildcard { prefix: String, suffix: String },
}

impl Pattern {
    pub fn parse(s: &str) -> Result<Pattern, PatternError> {
        if s.is_empty() {
            return Err(PatternError::Empty);
        }
        let mut parts = s.splitn(3, WILDCARD);
        let prefix = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => Ok(Pattern::Literal(s.to_owned())),
            (Some(suffix), None) => Ok(Pattern::Wildcard {
                prefix: prefix.to_owned(),
                suffix: suffix.to_owned(),
            }),
            (Some(_), Some(_)) => Err(PatternError::MultipleWildcards(s.to_owned())),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Pattern::Wildcard { .. })
    }

    /// The stem is never empty, so `%.html` does not match `.html`.
    pub fn matches(&self, candidate: &str) -> Option<Bindings> {
        match self {
            Pattern::Literal(name) => {
                if name == candidate {
                    Some(Bindings::default())
                } else {
                    None
                }
            }
            Pattern::Wildcard { prefix, suffix } => {
                if candidate.len() <= prefix.len() + suffix.len()
                    || !candidate.starts_with(prefix.as_str())
                    || !candidate.ends_with(suffix.as_str())
                {
                    return None;
                }
                let stem = &candidate[prefix.len()..candidate.len() - suffix.len()];
                Some(Bindings::with_stem(stem))
            }
        }
    }

    pub fn substitute(&self, stem: &str) -> String {
        match self {
            Pattern::Literal(name) => name.clone(),
            Pattern::Wildcard { prefix, suffix } => {
                let mut s = String::with_capacity(prefix.len() + stem.len() + suffix.len());
                s.push_str(prefix);
                s.push_str(stem);
                s.push_str(suffix);
                s
            }
        }
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Literal(name) => write!(f, "{}", name),
            Pattern::Wildcard { prefix, suffix } => write!(f, "{}{}{}", prefix, WILDCARD, suffix),
        }
    }
}
