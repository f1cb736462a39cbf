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

use sitemake_metrics::scoped_metric;
use std::{
    io::{ErrorKind, Result},
    path::Path,
    time::SystemTime,
};

pub trait DiskInterface {
    fn modified<P: AsRef<Path>>(&self, p: P) -> Result<SystemTime>;

    /// Like `modified`, but absence is a value rather than an error.
    fn modified_if_exists<P: AsRef<Path>>(&self, p: P) -> Result<Option<SystemTime>> {
        match self.modified(p) {
            Ok(t) => Ok(Some(t)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDiskInterface;

impl DiskInterface for SystemDiskInterface {
    fn modified<P: AsRef<Path>>(&self, p: P) -> Result<SystemTime> {
        scoped_metric!("stat");
        std::fs::metadata(p)?.modified()
    }

    fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()> {
        std::fs::remove_file(p)
    }
}

impl<D: DiskInterface> DiskInterface for &D {
    fn modified<P: AsRef<Path>>(&self, p: P) -> Result<SystemTime> {
        (**self).modified(p)
    }

    fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()> {
        (**self).remove_file(p)
    }
}
