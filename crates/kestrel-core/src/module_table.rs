//! # Module Shadow Table
//!
//! The debugger keeps one [`DebuggerModule`] shadow per loaded runtime
//! module and finds them through a [`DebuggerModuleTable`]. The table does
//! no locking of its own: every mutation asserts that the caller already
//! holds the debugger data lock, which is the single serialization point
//! for module load and unload processing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::sync::DebuggerLock;
use crate::types::{AppDomainId, RuntimeModuleId};

/// Debugger-side shadow of one loaded runtime module
///
/// Tracks the per-module state the engine cares about: which domain the
/// module loaded into, whether class-load callbacks are wanted, and what
/// the JIT has already done to its code. Modules shared across domains
/// surface one *primary* shadow; the others link to it.
#[derive(Debug, Clone)]
pub struct DebuggerModule
{
    runtime_module: RuntimeModuleId,
    app_domain: AppDomainId,
    /// Key of the primary shadow for shared modules. Self-referential for
    /// ordinary modules.
    primary: RuntimeModuleId,
    class_load_callbacks: bool,
    has_any_optimized_code: bool,
    can_change_jit_flags: bool,
}

impl DebuggerModule
{
    /// New shadow, primary to itself, JIT flags still changeable.
    pub fn new(runtime_module: RuntimeModuleId, app_domain: AppDomainId) -> Self
    {
        DebuggerModule {
            runtime_module,
            app_domain,
            primary: runtime_module,
            class_load_callbacks: false,
            has_any_optimized_code: false,
            can_change_jit_flags: true,
        }
    }

    pub fn runtime_module(&self) -> RuntimeModuleId
    {
        self.runtime_module
    }

    pub fn app_domain(&self) -> AppDomainId
    {
        self.app_domain
    }

    pub fn primary(&self) -> RuntimeModuleId
    {
        self.primary
    }

    pub fn set_primary(&mut self, primary: RuntimeModuleId)
    {
        self.primary = primary;
    }

    pub fn is_primary(&self) -> bool
    {
        self.primary == self.runtime_module
    }

    pub fn class_load_callbacks_enabled(&self) -> bool
    {
        self.class_load_callbacks
    }

    pub fn set_class_load_callbacks(&mut self, enabled: bool)
    {
        self.class_load_callbacks = enabled;
    }

    /// Has the JIT ever produced optimized code for this module? Latches;
    /// optimized code cannot be un-produced.
    pub fn has_any_optimized_code(&self) -> bool
    {
        self.has_any_optimized_code
    }

    pub fn note_optimized_code(&mut self)
    {
        self.has_any_optimized_code = true;
    }

    /// Can the debugger still change this module's JIT flags? True until
    /// the first method is compiled.
    pub fn can_change_jit_flags(&self) -> bool
    {
        self.can_change_jit_flags
    }

    pub fn set_can_change_jit_flags(&mut self, can_change: bool)
    {
        self.can_change_jit_flags = can_change;
    }
}

/// Keyed table of module shadows
///
/// Lookup is by runtime module id. Removal is driven by the unloading
/// identity the runtime reports, which names both the module and the
/// domain, so it scans rather than trusting the key alone.
pub struct DebuggerModuleTable
{
    lock: Arc<DebuggerLock>,
    modules: HashMap<RuntimeModuleId, DebuggerModule>,
}

impl DebuggerModuleTable
{
    /// New empty table guarded by `lock`.
    pub fn new(lock: Arc<DebuggerLock>) -> Self
    {
        DebuggerModuleTable {
            lock,
            modules: HashMap::new(),
        }
    }

    fn assert_locked(&self)
    {
        debug_assert!(
            self.lock.held_by_current_thread(),
            "module table mutated without the debugger lock"
        );
    }

    /// Register a shadow for a freshly loaded module.
    pub fn add_module(&mut self, module: DebuggerModule)
    {
        self.assert_locked();
        let key = module.runtime_module();
        debug!(module = key.value(), domain = module.app_domain().value(), "adding module shadow");
        if self.modules.insert(key, module).is_some() {
            warn!(module = key.value(), "module shadow replaced an existing entry");
        }
    }

    pub fn get_module(&self, module: RuntimeModuleId) -> Option<&DebuggerModule>
    {
        self.modules.get(&module)
    }

    pub fn get_module_mut(&mut self, module: RuntimeModuleId) -> Option<&mut DebuggerModule>
    {
        self.assert_locked();
        self.modules.get_mut(&module)
    }

    /// Drop the shadow for one unloading module.
    pub fn remove_module(&mut self, module: RuntimeModuleId, app_domain: AppDomainId)
    {
        self.assert_locked();
        let key = self
            .modules
            .iter()
            .find(|(_, entry)| {
                entry.runtime_module() == module && entry.app_domain() == app_domain
            })
            .map(|(key, _)| *key);
        match key {
            Some(key) => {
                self.modules.remove(&key);
                debug!(module = module.value(), domain = app_domain.value(), "removed module shadow");
            }
            None => {
                warn!(
                    module = module.value(),
                    domain = app_domain.value(),
                    "unload for a module with no shadow"
                );
            }
        }
    }

    /// Drop every shadow belonging to an unloading domain.
    pub fn remove_modules(&mut self, app_domain: AppDomainId)
    {
        self.assert_locked();
        let before = self.modules.len();
        self.modules.retain(|_, entry| entry.app_domain() != app_domain);
        debug!(
            domain = app_domain.value(),
            removed = before - self.modules.len(),
            "swept module shadows for domain"
        );
    }

    pub fn clear(&mut self)
    {
        self.assert_locked();
        self.modules.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &DebuggerModule>
    {
        self.modules.values()
    }

    pub fn len(&self) -> usize
    {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn locked_table() -> (Arc<DebuggerLock>, DebuggerModuleTable)
    {
        let lock = Arc::new(DebuggerLock::new("debugger"));
        lock.acquire();
        let table = DebuggerModuleTable::new(Arc::clone(&lock));
        (lock, table)
    }

    #[test]
    fn test_add_get_remove()
    {
        let (lock, mut table) = locked_table();

        table.add_module(DebuggerModule::new(RuntimeModuleId::new(1), AppDomainId::new(1)));
        table.add_module(DebuggerModule::new(RuntimeModuleId::new(2), AppDomainId::new(1)));
        assert_eq!(table.len(), 2);
        assert!(table.get_module(RuntimeModuleId::new(1)).is_some());

        // Edge case: unload names the right module but the wrong domain.
        table.remove_module(RuntimeModuleId::new(1), AppDomainId::new(9));
        assert_eq!(table.len(), 2);

        table.remove_module(RuntimeModuleId::new(1), AppDomainId::new(1));
        assert_eq!(table.len(), 1);
        assert!(table.get_module(RuntimeModuleId::new(1)).is_none());

        lock.release();
    }

    #[test]
    fn test_domain_sweep()
    {
        let (lock, mut table) = locked_table();

        table.add_module(DebuggerModule::new(RuntimeModuleId::new(1), AppDomainId::new(1)));
        table.add_module(DebuggerModule::new(RuntimeModuleId::new(2), AppDomainId::new(2)));
        table.add_module(DebuggerModule::new(RuntimeModuleId::new(3), AppDomainId::new(2)));

        table.remove_modules(AppDomainId::new(2));
        assert_eq!(table.len(), 1);
        assert!(table.get_module(RuntimeModuleId::new(1)).is_some());

        table.clear();
        assert!(table.is_empty());
        lock.release();
    }

    #[test]
    fn test_shadow_state()
    {
        let mut module = DebuggerModule::new(RuntimeModuleId::new(5), AppDomainId::new(1));
        assert!(module.is_primary());
        assert!(module.can_change_jit_flags());
        assert!(!module.has_any_optimized_code());

        module.set_primary(RuntimeModuleId::new(3));
        assert!(!module.is_primary());
        assert_eq!(module.primary(), RuntimeModuleId::new(3));

        module.note_optimized_code();
        module.set_can_change_jit_flags(false);
        assert!(module.has_any_optimized_code());
        assert!(!module.can_change_jit_flags());

        module.set_class_load_callbacks(true);
        assert!(module.class_load_callbacks_enabled());
    }
}
