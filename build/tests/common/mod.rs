use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::Path,
    time::{Duration, UNIX_EPOCH},
};

use sitemake_builder::{
    build_targets, BuildConfig, BuildError, BuildSummary, NullObserver, SystemDiskInterface,
};
use sitemake_rules::{Declaration, RuleSet, ToolPaths};
use tempfile::TempDir;

/// Sources are this old, outputs a little newer.
pub const SOURCE_TIME: u64 = 1_500_000_000;
pub const OUTPUT_TIME: u64 = SOURCE_TIME + 100;
pub const TOUCH_TIME: u64 = SOURCE_TIME + 200;

pub const ACTION: &str =
    "echo {TARGET} >> log.txt && {tool:transform} {ALL_PREREQS} > {TARGET}.tmp && mv {TARGET}.tmp {TARGET}";

pub struct Site {
    pub dir: TempDir,
    pub rules: RuleSet,
    pub config: BuildConfig,
}

impl Site {
    pub fn new(declaration: &str) -> Site {
        let dir = tempfile::tempdir().unwrap();
        let decl = Declaration::parse(declaration).unwrap();
        let rules = decl.rule_set().unwrap();
        let tools = ToolPaths::resolve(&decl.tools, Vec::<(String, String)>::new()).unwrap();
        let config = BuildConfig::new(dir.path(), tools);
        Site { dir, rules, config }
    }

    /// The index/about site: two pages sharing a generated stylesheet and a navbar.
    pub fn pages() -> Site {
        let site = Site::new(&format!(
            r#"
default = "all"

[tools]
transform = "cat"

[[rule]]
target = "all"
prerequisites = ["index.html", "about.html"]

[[rule]]
target = "site.xsl"
prerequisites = ["site.php"]
action = "{action}"

[[rule]]
target = "%.html"
prerequisites = ["%.xml", "site.xsl", "navbar.inc"]
action = "{action}"
"#,
            action = ACTION
        ));
        for source in &["index.xml", "about.xml", "site.php", "navbar.inc"] {
            site.write(source, source, SOURCE_TIME);
        }
        for output in &["site.xsl", "index.html", "about.html"] {
            site.write(output, "old", OUTPUT_TIME);
        }
        site
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str, mtime: u64) {
        let path = self.path().join(name);
        fs::write(&path, contents).unwrap();
        self.touch(name, mtime);
    }

    pub fn touch(&self, name: &str, mtime: u64) {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(self.path().join(name))
            .unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
            .unwrap();
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).unwrap()
    }

    /// Installs an executable script and points `tool` at it.
    pub fn script(&mut self, tool: &str, body: &str) {
        let name = format!("{}.sh", tool);
        let path = self.path().join(&name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        self.config
            .tools
            .insert(tool.to_owned(), path.display().to_string());
    }

    /// Targets whose action ran, in order.
    pub fn log(&self) -> Vec<String> {
        match fs::read_to_string(self.path().join("log.txt")) {
            Ok(log) => log.lines().map(str::to_owned).collect(),
            Err(_) => vec![],
        }
    }

    pub fn build(&self, targets: &[&str]) -> Result<BuildSummary, BuildError> {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        build_targets(
            &self.rules,
            &self.config,
            SystemDiskInterface,
            &targets,
            &NullObserver,
        )
    }
}
