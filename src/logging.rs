// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Logging setup
//!
//! Only compiled with the `profiling` feature:
//!
//! ```toml
//! [dependencies]
//! atom_ecs = { version = "0.3", features = ["profiling"] }
//! ```
//!
//! ```ignore
//! atom_ecs::logging::init()?;
//! // RUST_LOG=atom_ecs=debug shows entity and archetype events
//! ```
//!
//! Hosts that already install their own subscriber should skip this; the
//! crate only emits through `tracing` macros.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::{EcsError, Result};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber filtered by `RUST_LOG`
pub fn init() -> Result<()> {
    init_with_filter(DEFAULT_FILTER)
}

/// Like [`init`], with an explicit fallback filter
pub fn init_with_filter(fallback: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|err| EcsError::LoggerInit(err.to_string()))?;

    let subscriber = Registry::default().with(fmt::layer()).with(filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| EcsError::LoggerInit(err.to_string()))
}
