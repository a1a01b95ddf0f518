// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! A persistent task queue.
//!
//! This crate provides facilities to implement a persistent task queue backed
//! by a database.
//!
//! The client offered by `driver::Client` enqueues new tasks and fetches details
//! about their status by directly querying the database.  There can be as many
//! different clients as necessary accessing the tasks in this way.
//!
//! Each `driver::Worker` runs the tasks of a single kind.  Workers claim tasks
//! atomically, so any number of workers for the same kind can run against the
//! same database, whether in one process or across many.  Workers run as
//! background loops under a `Lifecycle` and can also be poked by an external
//! scheduler via the `/queue-loop` endpoint.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod db;
pub mod driver;
pub mod model;
pub mod rest;
