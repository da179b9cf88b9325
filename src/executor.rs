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

//! Level executor and frame profiling
//!
//! A failing system (error or panic) is logged and skipped. It never stops
//! the other systems of the frame.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{EcsError, Result};
use crate::system::{RenderSystem, System, SystemId};
use crate::World;

/// Per-system timing data for a single frame
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub system: SystemId,
    pub name: &'static str,
    pub duration: Duration,
    pub failed: bool,
}

/// Execution profile for a frame
#[derive(Debug, Clone, Default)]
pub struct ExecutionProfile {
    pub total_frame_time: Duration,
    pub level_count: usize,
    pub system_timings: Vec<SystemTiming>,
}

impl ExecutionProfile {
    pub fn timing(&self, system: SystemId) -> Option<&SystemTiming> {
        self.system_timings.iter().find(|timing| timing.system == system)
    }

    pub fn failed_systems(&self) -> impl Iterator<Item = &SystemTiming> + '_ {
        self.system_timings.iter().filter(|timing| timing.failed)
    }
}

/// Registered system plus its one-shot initialization flag
pub(crate) struct SystemSlot<S: ?Sized> {
    pub(crate) id: SystemId,
    pub(crate) name: &'static str,
    initialized: AtomicBool,
    system: Mutex<Box<S>>,
}

impl<S: ?Sized> SystemSlot<S> {
    pub(crate) fn new(id: SystemId, name: &'static str, system: Box<S>) -> Self {
        Self {
            id,
            name,
            initialized: AtomicBool::new(false),
            system: Mutex::new(system),
        }
    }

    /// True exactly once, for the first caller
    fn claim_initialization(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }
}

pub(crate) type UpdateSlot = Arc<SystemSlot<dyn System>>;
pub(crate) type RenderSlot = Arc<SystemSlot<dyn RenderSystem>>;

/// Run `f`, turning both errors and panics into a logged failure
fn run_guarded(name: &'static str, phase: &'static str, f: impl FnOnce() -> Result<()>) -> bool {
    let reason = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return true,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let failure = EcsError::SystemUpdateFailure {
        system: name.to_string(),
        reason,
    };
    tracing::error!(system = name, phase, error = %failure, "system failed");
    false
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Initialize every slot that has not been initialized yet
pub(crate) fn initialize_pending(world: &World, slots: &[UpdateSlot]) {
    for slot in slots {
        if slot.claim_initialization() {
            let mut system = slot.system.lock();
            run_guarded(slot.name, "initialize", || system.initialize(world));
        }
    }
}

fn run_update(world: &World, slot: &SystemSlot<dyn System>, delta_time: f32) -> SystemTiming {
    let start = Instant::now();
    let mut system = slot.system.lock();
    let ok = run_guarded(slot.name, "update", || system.update(world, delta_time));
    SystemTiming {
        system: slot.id,
        name: slot.name,
        duration: start.elapsed(),
        failed: !ok,
    }
}

/// Run one level and wait for all of its systems
pub(crate) fn execute_level(
    world: &World,
    level: &[UpdateSlot],
    delta_time: f32,
    parallel: bool,
) -> Vec<SystemTiming> {
    #[cfg(feature = "parallel")]
    if parallel && level.len() > 1 {
        use rayon::prelude::*;
        return level
            .par_iter()
            .map(|slot| run_update(world, slot, delta_time))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    level
        .iter()
        .map(|slot| run_update(world, slot, delta_time))
        .collect()
}

/// Render every slot in order, initializing first-timers
pub(crate) fn execute_render(world: &World, slots: &[RenderSlot], delta_time: f32) {
    for slot in slots {
        let mut system = slot.system.lock();
        if slot.claim_initialization() {
            run_guarded(slot.name, "initialize", || system.initialize(world));
        }
        run_guarded(slot.name, "render", || system.render(world, delta_time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_reports_error_and_panic() {
        assert!(run_guarded("ok", "update", || Ok(())));
        assert!(!run_guarded("err", "update", || Err(EcsError::InvalidConfig("x".into()))));
        assert!(!run_guarded("panic", "update", || panic!("boom")));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload = catch_unwind(|| panic!("value {}", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "value 3");
        let payload = catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn test_profile_lookup() {
        let profile = ExecutionProfile {
            total_frame_time: Duration::from_millis(2),
            level_count: 1,
            system_timings: vec![SystemTiming {
                system: SystemId(3),
                name: "physics",
                duration: Duration::from_millis(1),
                failed: true,
            }],
        };
        assert_eq!(profile.timing(SystemId(3)).map(|t| t.name), Some("physics"));
        assert_eq!(profile.failed_systems().count(), 1);
    }
}
