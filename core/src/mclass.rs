//! Module classes and their registry.
//!
//! A module class is the immutable "type" of a graph vertex: a name plus a
//! capability set. Classes are registered once at startup and never removed,
//! mirroring the driver registry. Live instances are in [`crate::module`].
//!
//! Every capability except `init` has a default implementation, so a class
//! declares only what it supports; the dispatcher and diagnostics probe the
//! defaults' sentinel behavior (`query` answers `ENOTSUP`, `get_desc`/
//! `get_dump` answer `None`).

use std::any::Any;
use std::sync::Arc;

use spin::RwLock;

use softnic_abi::{EEXIST, ENOTSUP, Sval};
use softnic_drivers::PacketBatch;

use crate::module::Module;

/// Per-instance private state owned by the module, interpreted by its class.
pub type ModuleState = Box<dyn Any + Send + Sync>;

/// Declared during `init`, one per task slot the module offers.
#[derive(Clone, Debug, Default)]
pub struct TaskSpec {
    /// Opaque argument handed back to `run_task` on every invocation.
    pub arg: Sval,
}

/// What one task invocation accomplished, for scheduler accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskResult {
    pub packets: u64,
    pub bits: u64,
}

/// A module class.
///
/// Hook methods take the live [`Module`] so that packet-driven classes can
/// push batches onward through its gates; private state is reached through
/// [`Module::private`].
pub trait ModuleClass: Send + Sync {
    /// Unique registry key, e.g. `"NoOP"`.
    fn name(&self) -> &'static str;

    /// Build the instance state and declare its task slots. Failing here
    /// aborts `create_module`; the returned error is surfaced unchanged.
    /// Runs under the module-table lock: do not call back into the table.
    fn init(&self, arg: &Sval) -> Result<(ModuleState, Vec<TaskSpec>), Sval>;

    /// Release instance resources. The module is already unreachable.
    fn deinit(&self, _module: &Module) {}

    /// Handle a batch arriving on an inbound edge.
    fn process_batch(&self, _module: &Module, _batch: &mut PacketBatch) {}

    /// One scheduler invocation for source/sink classes.
    fn run_task(&self, _module: &Module, _arg: &Sval) -> TaskResult {
        TaskResult::default()
    }

    /// Live reconfiguration via the `module` control route.
    fn query(&self, _module: &Module, _arg: &Sval) -> Sval {
        Sval::err(ENOTSUP, "Module class does not support queries")
    }

    /// One-line description for listing replies.
    fn get_desc(&self, _module: &Module) -> Option<Sval> {
        None
    }

    /// Full state dump for diagnostics.
    fn get_dump(&self, _module: &Module) -> Option<Sval> {
        None
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Sorted by class name; startup-only writes.
static MCLASSES: RwLock<Vec<Arc<dyn ModuleClass>>> = RwLock::new(Vec::new());

/// Register a class. A duplicate name is refused with `EEXIST`.
pub fn register_mclass(mclass: Arc<dyn ModuleClass>) -> Result<(), Sval> {
    let mut classes = MCLASSES.write();
    let name = mclass.name();
    match classes.binary_search_by(|c| c.name().cmp(name)) {
        Ok(_) => Err(Sval::err(EEXIST, format!("Module class '{name}' is already registered"))),
        Err(pos) => {
            classes.insert(pos, mclass);
            Ok(())
        }
    }
}

pub fn find_mclass(name: &str) -> Option<Arc<dyn ModuleClass>> {
    let classes = MCLASSES.read();
    classes
        .binary_search_by(|c| c.name().cmp(name))
        .ok()
        .map(|pos| Arc::clone(&classes[pos]))
}

/// A bounded page of registered classes in name order.
pub fn list_mclasses(offset: usize, limit: usize) -> Vec<Arc<dyn ModuleClass>> {
    let classes = MCLASSES.read();
    classes.iter().skip(offset).take(limit).map(Arc::clone).collect()
}
