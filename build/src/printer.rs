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

use std::cell::Cell;

use console::{style, Term};

use crate::{
    build_task::{CommandTaskError, CommandTaskResult},
    interface::BuildObserver,
    scheduler::BuildSummary,
};

/// Prints ninja style `[n/total] target` progress lines to stderr.
#[derive(Debug)]
pub struct ConsolePrinter {
    term: Term,
    verbose: bool,
    total: Cell<usize>,
    started: Cell<usize>,
}

impl ConsolePrinter {
    pub fn new(verbose: bool) -> Self {
        ConsolePrinter {
            term: Term::stderr(),
            verbose,
            total: Cell::new(0),
            started: Cell::new(0),
        }
    }

    // Nothing useful can be done if stderr is gone.
    fn line(&self, s: &str) {
        let _ = self.term.write_line(s);
    }

    fn replay(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        self.line(text.trim_end_matches('\n'));
    }
}

impl BuildObserver for ConsolePrinter {
    fn planned(&self, total: usize) {
        self.total.set(total);
    }

    fn started(&self, target: &str, command: &str) {
        let n = self.started.get() + 1;
        self.started.set(n);
        let progress = format!("[{}/{}]", n, self.total.get());
        if self.verbose {
            self.line(&format!("{} {}", style(progress).dim(), command));
        } else {
            self.line(&format!("{} {}", style(progress).dim(), target));
        }
    }

    fn finished(&self, target: &str, result: &CommandTaskResult) {
        match result {
            Ok(output) => {
                self.replay(&output.stdout);
                self.replay(&output.stderr);
            }
            Err(e) => {
                self.line(&format!("{} {}", style("FAILED:").red().bold(), target));
                if let CommandTaskError::CommandFailed(output) = e {
                    self.replay(&output.stdout);
                }
                match e.stderr() {
                    Some(stderr) => self.replay(stderr),
                    None => self.line(&e.to_string()),
                }
            }
        }
    }

    fn completed(&self, summary: &BuildSummary) {
        if summary.is_success() && summary.rebuilt() == 0 {
            self.line("sitemake: no work to do.");
        }
    }
}
