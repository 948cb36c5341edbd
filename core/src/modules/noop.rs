//! `NoOP`: a module that does nothing, usefully.
//!
//! It offers a single task slot whose invocations report zero work, which
//! makes it the canonical placeholder for wiring up graphs and exercising
//! the scheduler without touching packets.

use softnic_abi::Sval;

use crate::mclass::{ModuleClass, ModuleState, TaskResult, TaskSpec};
use crate::module::Module;

pub struct NoOP;

impl ModuleClass for NoOP {
    fn name(&self) -> &'static str {
        "NoOP"
    }

    fn init(&self, _arg: &Sval) -> Result<(ModuleState, Vec<TaskSpec>), Sval> {
        Ok((Box::new(()), vec![TaskSpec::default()]))
    }

    fn run_task(&self, _module: &Module, _arg: &Sval) -> TaskResult {
        TaskResult { packets: 0, bits: 0 }
    }
}
