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
    io::ErrorKind,
    path::{Path, PathBuf},
};

use glob::{MatchOptions, Pattern};
use sitemake_metrics::scoped_metric;
use tracing::debug;
use walkdir::WalkDir;

use crate::{
    disk_interface::DiskInterface,
    error::{BuildError, ConfigError},
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Relative to the root, in walk order.
    pub removed: Vec<PathBuf>,
}

struct CleanPattern {
    pattern: Pattern,
    // Patterns with a separator are matched against the whole relative path, others against the
    // file name only.
    whole_path: bool,
}

impl CleanPattern {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    fn parse(s: &str) -> Result<CleanPattern, ConfigError> {
        let pattern = Pattern::new(s).map_err(|source| ConfigError::InvalidCleanPattern {
            pattern: s.to_owned(),
            source,
        })?;
        Ok(CleanPattern {
            pattern,
            whole_path: s.contains('/'),
        })
    }

    fn matches(&self, relative: &Path) -> bool {
        if self.whole_path {
            self.pattern.matches_path_with(relative, Self::OPTIONS)
        } else {
            match relative.file_name() {
                Some(name) => self
                    .pattern
                    .matches_path_with(Path::new(name), Self::OPTIONS),
                None => false,
            }
        }
    }
}

/// Removes every file under `root` matching any of `patterns`. Directories are left alone.
///
/// Files that vanish before they can be removed are not an error. Matching nothing is success.
pub fn clean<D: DiskInterface, S: AsRef<str>>(
    disk: &D,
    root: &Path,
    patterns: &[S],
) -> Result<CleanReport, BuildError> {
    scoped_metric!("clean");
    if patterns.is_empty() {
        return Err(ConfigError::NoCleanPatterns.into());
    }
    let patterns = patterns
        .iter()
        .map(|p| CleanPattern::parse(p.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = CleanReport::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_owned).unwrap_or_else(|| root.to_owned());
                let source = std::io::Error::from(e);
                if source.kind() == ErrorKind::NotFound {
                    continue;
                }
                return Err(BuildError::FileSystem { path, source });
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        if !patterns.iter().any(|p| p.matches(relative)) {
            continue;
        }
        match disk.remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %relative.display(), "removed");
                report.removed.push(relative.to_owned());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(BuildError::FileSystem {
                    path: entry.path().to_owned(),
                    source,
                })
            }
        }
    }
    Ok(report)
}
