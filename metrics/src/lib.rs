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

//! RAII timers for the phases of a sitemake invocation.
//!
//! A metric is declared at its use site with [`scoped_metric!`], which times the rest of the
//! enclosing block. Nothing is recorded unless [`enable`] was called, so the macro is cheap to
//! leave in hot paths like `stat`.

use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread_local,
    time::{Duration, Instant},
};

#[derive(Debug)]
struct Metric {
    name: &'static str,
    count: u64,
    total: Duration,
}

#[derive(Debug, Default)]
struct Registry {
    metrics: Vec<Metric>,
}

impl Registry {
    fn register(&mut self, name: &'static str) -> usize {
        self.metrics.push(Metric {
            name,
            count: 0,
            total: Duration::default(),
        });
        self.metrics.len() - 1
    }

    fn record(&mut self, index: usize, elapsed: Duration) {
        if let Some(metric) = self.metrics.get_mut(index) {
            metric.count += 1;
            metric.total += elapsed;
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Wide enough for the "metric" header.
        let width = self
            .metrics
            .iter()
            .map(|m| m.name.len())
            .max()
            .unwrap_or(0)
            .max(6);
        writeln!(
            f,
            "{:width$} {:>6} {:>9} {:>11}",
            "metric",
            "count",
            "avg (us)",
            "total (us)",
            width = width
        )?;
        writeln!(
            f,
            "{:-<width$} {:-<6} {:-<9} {:-<11}",
            "",
            "",
            "",
            "",
            width = width
        )?;
        for metric in &self.metrics {
            let total = metric.total.as_micros();
            let avg = if metric.count == 0 {
                0.0
            } else {
                total as f64 / metric.count as f64
            };
            writeln!(
                f,
                "{:width$} {:>6} {:>9.1} {:>11}",
                metric.name,
                metric.count,
                avg,
                total,
                width = width
            )?;
        }
        Ok(())
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Records the time between its creation and drop against a registered metric.
#[derive(Debug)]
pub struct ScopedMetric {
    index: usize,
    start: Instant,
}

impl ScopedMetric {
    pub fn new(index: usize) -> Self {
        ScopedMetric {
            index,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedMetric {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        REGISTRY.with(|r| r.borrow_mut().record(self.index, elapsed));
    }
}

/// Times the remainder of the enclosing block under `$name`.
#[macro_export]
macro_rules! scoped_metric {
    ($name:literal) => {
        let _scoped_metric = if $crate::is_enabled() {
            thread_local! {
                static METRIC_INDEX: usize = $crate::register($name);
            }
            ::core::option::Option::Some($crate::ScopedMetric::new(
                METRIC_INDEX.with(|index| *index),
            ))
        } else {
            ::core::option::Option::None
        };
    };
}

pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn register(name: &'static str) -> usize {
    REGISTRY.with(|r| r.borrow_mut().register(name))
}

/// Renders the metrics recorded on this thread as a table.
pub fn report() -> String {
    REGISTRY.with(|r| r.borrow().to_string())
}
