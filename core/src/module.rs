//! Live modules, the module table, and the gate graph.
//!
//! Modules are arena entries keyed by a stable id; gates store the
//! downstream's id, never an owning reference, so the graph may freely
//! contain cycles without leaking. Back-edges are not stored: destroying a
//! module scans every other module's gates for edges pointing at the victim
//! (control-plane frequency, small tables).
//!
//! All mutation happens on the control thread with the relevant write locks
//! held, and (for anything reachable from a worker) only while every
//! worker is paused (the dispatcher enforces this, not the table). Workers
//! take read locks on gate arrays and bump relaxed counters only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use softnic_abi::{E2BIG, EBUSY, EEXIST, ENOENT, MAX_GATES, Sval};
use softnic_drivers::PacketBatch;
use softnic_lib::clock::epoch_now;
use softnic_lib::dlog_info;

use crate::mclass::{ModuleClass, ModuleState};
use crate::tap::Tap;
use crate::task::Task;
use crate::worker;

/// Gate index type. The u16 range is further capped by [`MAX_GATES`].
pub type GateIdx = u16;

/// Stable module identity, unique for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleId(u64);

// =============================================================================
// Gates
// =============================================================================

/// One outbound edge slot.
///
/// Counters are written by workers with relaxed increments and never reset;
/// they disappear with the module.
#[derive(Debug)]
pub struct Gate {
    downstream: Option<ModuleId>,
    tap: Option<Tap>,
    cnt: AtomicU64,
    pkts: AtomicU64,
    bytes: AtomicU64,
}

impl Gate {
    fn new() -> Self {
        Self {
            downstream: None,
            tap: None,
            cnt: AtomicU64::new(0),
            pkts: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn downstream(&self) -> Option<ModuleId> {
        self.downstream
    }
}

// =============================================================================
// Module
// =============================================================================

/// A live graph vertex.
pub struct Module {
    id: ModuleId,
    name: String,
    mclass: Arc<dyn ModuleClass>,
    state: ModuleState,
    gates: RwLock<Vec<Gate>>,
    tasks: Vec<Arc<Task>>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mclass", &self.mclass.name())
            .field("state", &self.state)
            .field("gates", &self.gates)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl Module {
    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn mclass(&self) -> &Arc<dyn ModuleClass> {
        &self.mclass
    }

    /// Class-private state; classes downcast to their own type.
    #[inline]
    pub fn private(&self) -> &ModuleState {
        &self.state
    }

    #[inline]
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn allocated_gates(&self) -> usize {
        self.gates.read().len()
    }

    /// Push a batch through outbound gate `gate`: bump counters, copy to an
    /// attached tap, and hand the batch to the downstream module's class.
    /// A dead-end gate (unallocated, disconnected, or downstream destroyed
    /// mid-flight) drops the batch.
    pub fn send_to_gate(&self, gate: GateIdx, batch: &mut PacketBatch) {
        let downstream_id = {
            let gates = self.gates.read();
            let Some(g) = gates.get(gate as usize) else {
                return;
            };
            g.cnt.fetch_add(1, Ordering::Relaxed);
            g.pkts.fetch_add(batch.len() as u64, Ordering::Relaxed);
            g.bytes.fetch_add(batch.total_bytes(), Ordering::Relaxed);
            if let Some(tap) = &g.tap {
                tap.log_batch(batch);
            }
            g.downstream
        };
        let Some(id) = downstream_id else {
            return;
        };
        let Some(next) = find_module_by_id(id) else {
            return;
        };
        next.mclass.process_batch(&next, batch);
    }
}

// =============================================================================
// Module table
// =============================================================================

struct ModuleTable {
    by_name: BTreeMap<String, Arc<Module>>,
    next_id: u64,
}

static MODULES: RwLock<ModuleTable> =
    RwLock::new(ModuleTable { by_name: BTreeMap::new(), next_id: 0 });

fn synthesize_name(table: &BTreeMap<String, Arc<Module>>, mclass_name: &str) -> String {
    for n in 0.. {
        let candidate = format!("{mclass_name}{n}");
        if !table.contains_key(&candidate) {
            return candidate;
        }
    }
    unreachable!("fewer than usize::MAX modules exist")
}

/// Create a module instance of `mclass`.
///
/// The table write lock is held across name allocation, `init`, and insert;
/// a failed `init` leaves no trace and its error is returned unchanged.
pub fn create_module(
    name_opt: Option<&str>,
    mclass: &Arc<dyn ModuleClass>,
    arg: &Sval,
) -> Result<Arc<Module>, Sval> {
    let mut table = MODULES.write();

    let name = match name_opt {
        Some(name) => {
            if table.by_name.contains_key(name) {
                return Err(Sval::err(EEXIST, format!("Module '{name}' already exists")));
            }
            name.to_owned()
        }
        None => synthesize_name(&table.by_name, mclass.name()),
    };

    let (state, task_specs) = mclass.init(arg)?;
    if task_specs.len() > softnic_abi::MAX_TASKS_PER_MODULE {
        return Err(Sval::err(
            softnic_abi::EINVAL,
            format!(
                "Module class '{}' declared {} tasks (limit {})",
                mclass.name(),
                task_specs.len(),
                softnic_abi::MAX_TASKS_PER_MODULE
            ),
        ));
    }

    let id = ModuleId(table.next_id);
    table.next_id += 1;

    let module = Arc::new_cyclic(|weak| Module {
        id,
        name: name.clone(),
        mclass: Arc::clone(mclass),
        state,
        gates: RwLock::new(Vec::new()),
        tasks: task_specs
            .iter()
            .enumerate()
            .map(|(tid, spec)| Arc::new(Task::new(weak.clone(), tid, spec)))
            .collect(),
    });

    table.by_name.insert(name.clone(), Arc::clone(&module));
    dlog_info!("module {} created (mclass {})", name, mclass.name());
    Ok(module)
}

/// Destroy `module`: detach its tasks, disconnect every inbound edge, run
/// `deinit`, remove from the table. Requires a quiesced dataplane.
pub fn destroy_module(module: &Arc<Module>) -> Result<(), Sval> {
    let mut table = MODULES.write();
    if table.by_name.remove(&module.name).is_none() {
        return Err(Sval::err(ENOENT, format!("No module '{}' found", module.name)));
    }

    for task in &module.tasks {
        if let Some(wid) = task.attached_worker() {
            worker::detach_from_worker(wid, task);
            task.detach();
        }
    }

    // Back-edges are not stored: scan every surviving module for gates
    // pointing at the victim.
    for other in table.by_name.values() {
        let mut gates = other.gates.write();
        for g in gates.iter_mut() {
            if g.downstream == Some(module.id) {
                g.downstream = None;
                g.tap = None;
            }
        }
    }

    // Deinit runs with the table unlocked so a class may look other
    // modules up while tearing down.
    drop(table);
    module.mclass.deinit(module);
    dlog_info!("module {} destroyed", module.name);
    Ok(())
}

pub fn find_module(name: &str) -> Option<Arc<Module>> {
    MODULES.read().by_name.get(name).map(Arc::clone)
}

fn find_module_by_id(id: ModuleId) -> Option<Arc<Module>> {
    MODULES.read().by_name.values().find(|m| m.id == id).map(Arc::clone)
}

/// A bounded page of modules in name order.
pub fn list_modules(offset: usize, limit: usize) -> Vec<Arc<Module>> {
    MODULES.read().by_name.values().skip(offset).take(limit).map(Arc::clone).collect()
}

/// Destroy every module, draining one at a time so each destruction sees a
/// consistent table for its back-edge scan.
pub fn reset_modules() -> Result<(), Sval> {
    loop {
        let Some(module) = list_modules(0, 1).pop() else {
            return Ok(());
        };
        destroy_module(&module)?;
    }
}

// =============================================================================
// Gate connections
// =============================================================================

/// Connect `src`'s outbound gate `gate` to `dst`, growing the gate array by
/// capacity doubling up to [`MAX_GATES`]. Errors are bare errno codes; the
/// command layer attaches the human message.
pub fn connect_modules(src: &Arc<Module>, gate: GateIdx, dst: &Arc<Module>) -> Result<(), u32> {
    let idx = gate as usize;
    if idx >= MAX_GATES {
        return Err(E2BIG);
    }
    let mut gates = src.gates.write();
    if idx >= gates.len() {
        let mut target = gates.len().max(1);
        while target <= idx {
            target *= 2;
        }
        let target = target.min(MAX_GATES);
        gates.resize_with(target, Gate::new);
    }
    let g = &mut gates[idx];
    if g.downstream.is_some() {
        return Err(EBUSY);
    }
    g.downstream = Some(dst.id);
    Ok(())
}

/// Clear gate `gate` of `src`, including any attached tap.
pub fn disconnect_modules(src: &Arc<Module>, gate: GateIdx) -> Result<(), u32> {
    let mut gates = src.gates.write();
    let Some(g) = gates.get_mut(gate as usize) else {
        return Err(ENOENT);
    };
    if g.downstream.is_none() {
        return Err(ENOENT);
    }
    g.downstream = None;
    g.tap = None;
    Ok(())
}

/// Attach a capture tap to an already-allocated gate, replacing any
/// previous one.
pub(crate) fn attach_tap(module: &Arc<Module>, gate: GateIdx, tap: Tap) -> Result<(), u32> {
    let mut gates = module.gates.write();
    let Some(g) = gates.get_mut(gate as usize) else {
        return Err(softnic_abi::EINVAL);
    };
    g.tap = Some(tap);
    Ok(())
}

pub(crate) fn detach_tap(module: &Arc<Module>, gate: GateIdx) -> Result<(), u32> {
    let mut gates = module.gates.write();
    let Some(g) = gates.get_mut(gate as usize) else {
        return Err(softnic_abi::EINVAL);
    };
    if g.tap.take().is_none() {
        return Err(ENOENT);
    }
    Ok(())
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Build the `get_module_info` reply map. Only connected gates are listed,
/// in ascending index order.
pub fn get_module_info(module: &Arc<Module>) -> Sval {
    let mut r = Sval::map();
    r.map_set("name", Sval::str(module.name()));
    r.map_set("mclass", Sval::str(module.mclass.name()));

    if let Some(desc) = module.mclass.get_desc(module) {
        r.map_set("desc", desc);
    }
    if let Some(dump) = module.mclass.get_dump(module) {
        r.map_set("dump", dump);
    }

    let mut gates = Sval::list();
    {
        let table = MODULES.read();
        let gate_arr = module.gates.read();
        for (i, g) in gate_arr.iter().enumerate() {
            let Some(downstream) = g.downstream else {
                continue;
            };
            let Some(next) = table.by_name.values().find(|m| m.id == downstream) else {
                continue;
            };
            let mut entry = Sval::map();
            entry.map_set("gate", Sval::uint(i as u64));
            entry.map_set("cnt", Sval::uint(g.cnt.load(Ordering::Relaxed)));
            entry.map_set("pkts", Sval::uint(g.pkts.load(Ordering::Relaxed)));
            entry.map_set("timestamp", Sval::double(epoch_now()));
            entry.map_set("name", Sval::str(next.name()));
            gates.list_add(entry);
        }
    }
    r.map_set("gates", gates);
    r
}

/// Depth-first search for a cycle in the gate graph. Returns the module
/// names along one cycle, or `None` for an acyclic graph. Read-only; safe
/// to run concurrently with workers.
pub fn find_cycle() -> Option<Vec<String>> {
    let table = MODULES.read();
    let modules: Vec<&Arc<Module>> = table.by_name.values().collect();
    let index_of: BTreeMap<ModuleId, usize> =
        modules.iter().enumerate().map(|(i, m)| (m.id, i)).collect();

    // 0 = unvisited, 1 = on the current path, 2 = done.
    let mut color = vec![0u8; modules.len()];
    let mut parent = vec![usize::MAX; modules.len()];

    for start in 0..modules.len() {
        if color[start] != 0 {
            continue;
        }
        // Iterative DFS; each stack entry is (node, edges to visit).
        let mut stack = vec![(start, adjacent(modules[start], &index_of))];
        color[start] = 1;
        while let Some((node, edges)) = stack.last_mut() {
            let node = *node;
            match edges.pop() {
                Some(next) if color[next] == 1 => {
                    // Found a back edge: walk parents to recover the loop.
                    let mut cycle = vec![modules[node].name.clone()];
                    let mut cur = node;
                    while cur != next {
                        cur = parent[cur];
                        cycle.push(modules[cur].name.clone());
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
                Some(next) if color[next] == 0 => {
                    color[next] = 1;
                    parent[next] = node;
                    stack.push((next, adjacent(modules[next], &index_of)));
                }
                Some(_) => {}
                None => {
                    color[node] = 2;
                    stack.pop();
                }
            }
        }
    }
    None
}

fn adjacent(module: &Arc<Module>, index_of: &BTreeMap<ModuleId, usize>) -> Vec<usize> {
    module
        .gates
        .read()
        .iter()
        .filter_map(|g| g.downstream)
        .filter_map(|id| index_of.get(&id).copied())
        .collect()
}
