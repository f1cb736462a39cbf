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

use std::{collections::BTreeMap, ffi::OsString};

use crate::DeclError;

pub const TOOL_ENV_PREFIX: &str = "SITEMAKE_TOOL_";

/// Paths to the external tools actions may refer to as `{tool:NAME}`.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    paths: BTreeMap<String, String>,
}

fn env_name(tool: &str) -> String {
    let mut name = String::from(TOOL_ENV_PREFIX);
    name.extend(tool.chars().map(|c| match c {
        '-' => '_',
        c => c.to_ascii_uppercase(),
    }));
    name
}

impl ToolPaths {
    /// Declared paths, overridden by `SITEMAKE_TOOL_<NAME>` entries from `env`.
    ///
    /// Only tools that are declared can be overridden; the environment never introduces new
    /// names. Variables that are not Unicode are ignored unless they override a declared tool,
    /// which is an error.
    pub fn resolve<I, K, V>(
        declared: &BTreeMap<String, String>,
        env: I,
    ) -> Result<ToolPaths, DeclError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut overrides: BTreeMap<String, OsString> = env
            .into_iter()
            .filter_map(|(k, v)| match k.into().into_string() {
                Ok(k) if k.starts_with(TOOL_ENV_PREFIX) => Some((k, v.into())),
                _ => None,
            })
            .collect();
        let mut paths = BTreeMap::new();
        for (tool, path) in declared {
            let variable = env_name(tool);
            let path = match overrides.remove(&variable) {
                Some(value) => value
                    .into_string()
                    .map_err(|_| DeclError::NonUnicodeTool(variable))?,
                None => path.clone(),
            };
            paths.insert(tool.clone(), path);
        }
        Ok(ToolPaths { paths })
    }

    pub fn get(&self, tool: &str) -> Option<&str> {
        self.paths.get(tool).map(String::as_str)
    }

    pub fn insert<S: Into<String>>(&mut self, tool: S, path: S) {
        self.paths.insert(tool.into(), path.into());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn declared() -> BTreeMap<String, String> {
        vec![
            ("xslt".to_owned(), "/usr/bin/xsltproc".to_owned()),
            ("html-tidy".to_owned(), "tidy".to_owned()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn declared_only() {
        let tools = ToolPaths::resolve(&declared(), Vec::<(String, String)>::new()).unwrap();
        assert_eq!(tools.get("xslt"), Some("/usr/bin/xsltproc"));
        assert_eq!(tools.get("php"), None);
    }

    #[test]
    fn env_overrides() {
        let env = vec![
            ("SITEMAKE_TOOL_HTML_TIDY".to_owned(), "/opt/tidy".to_owned()),
            ("SITEMAKE_TOOL_PHP".to_owned(), "/usr/bin/php".to_owned()),
            ("PATH".to_owned(), "/bin".to_owned()),
        ];
        let tools = ToolPaths::resolve(&declared(), env).unwrap();
        assert_eq!(tools.get("html-tidy"), Some("/opt/tidy"));
        assert_eq!(tools.get("php"), None);
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_environment() {
        use std::os::unix::ffi::OsStringExt;

        let bytes = || OsString::from_vec(vec![0xff, 0xfe]);
        let env = vec![
            (OsString::from("UNRELATED"), bytes()),
            (bytes(), OsString::from("x")),
            (OsString::from("SITEMAKE_TOOL_XSLT"), OsString::from("/opt/xsltproc")),
        ];
        let tools = ToolPaths::resolve(&declared(), env).unwrap();
        assert_eq!(tools.get("xslt"), Some("/opt/xsltproc"));

        let env = vec![(OsString::from("SITEMAKE_TOOL_HTML_TIDY"), bytes())];
        let err = ToolPaths::resolve(&declared(), env).unwrap_err();
        assert!(matches!(err, DeclError::NonUnicodeTool(v) if v == "SITEMAKE_TOOL_HTML_TIDY"));
    }
}
