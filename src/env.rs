//! Lexical environments.
//!
//! The VM keeps a stack of environments that doubles as the ownership
//! arena: `scope_start` pushes a child of the current environment,
//! `scope_end` pops it, and a function call pushes a fresh environment
//! whose parent is the script's global scope (the language has no upvalue
//! capture, so a function body sees its own locals plus globals). The
//! environments form a chain through `enclosing` indices; because scopes
//! and calls nest strictly, a plain vector works as the arena and
//! restoring a call's snapshot is a truncate.

use crate::object::{Heap, Obj, ObjRef};
use crate::table::{SetResult, Table};
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Environment {
    pub values: Table,
    pub enclosing: Option<usize>,
}

/// Why an assignment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undefined,
    /// The target's current value is a function; functions cannot be
    /// rebound.
    Function,
}

/// Saved position for restoring the chain when a call returns.
#[derive(Debug, Clone, Copy)]
pub struct EnvSnapshot {
    current: usize,
    len: usize,
}

#[derive(Debug)]
pub struct EnvStack {
    envs: Vec<Environment>,
    current: usize,
}

impl EnvStack {
    /// Start with a single outermost environment: the native scope that
    /// `init_vm` populates with bootstrapped bindings.
    pub fn new() -> EnvStack {
        EnvStack {
            envs: vec![Environment::default()],
            current: 0,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Push a child of `parent` and make it current.
    pub fn push(&mut self, parent: usize) -> usize {
        self.envs.push(Environment {
            values: Table::new(),
            enclosing: Some(parent),
        });
        self.current = self.envs.len() - 1;
        self.current
    }

    pub fn begin_scope(&mut self) {
        self.push(self.current);
    }

    pub fn end_scope(&mut self) {
        let enclosing = self.envs[self.current]
            .enclosing
            .expect("scope_end on the outermost environment");
        self.envs.pop();
        self.current = enclosing;
    }

    /// The current restore point, without entering anything.
    pub fn current_snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            current: self.current,
            len: self.envs.len(),
        }
    }

    /// Enter a call frame's environment. Returns the snapshot the frame
    /// restores on return.
    pub fn enter_call(&mut self, parent: usize) -> EnvSnapshot {
        let snapshot = EnvSnapshot {
            current: self.current,
            len: self.envs.len(),
        };
        self.push(parent);
        snapshot
    }

    /// Unwind to the state captured before a call.
    pub fn restore(&mut self, snapshot: EnvSnapshot) {
        self.envs.truncate(snapshot.len);
        self.current = snapshot.current;
    }

    /// The outermost (native) scope's table, where bootstrapped bindings
    /// and `include`d modules live.
    pub fn native_table_mut(&mut self) -> &mut Table {
        &mut self.envs[0].values
    }

    /// Create a binding in the current environment. Fails if the name is
    /// already bound there.
    pub fn define(&mut self, heap: &Heap, name: ObjRef, value: Value) -> bool {
        let hash = heap.str_hash(name);
        self.envs[self.current].values.define(name, hash, value)
    }

    /// Read a binding, searching outward from the current environment.
    pub fn get(&self, heap: &Heap, name: ObjRef) -> Option<Value> {
        let hash = heap.str_hash(name);
        let mut index = Some(self.current);
        while let Some(i) = index {
            if let Some(value) = self.envs[i].values.get(name, hash) {
                return Some(value);
            }
            index = self.envs[i].enclosing;
        }
        None
    }

    /// Overwrite a binding, searching outward. The binding must exist and
    /// must not currently hold a function.
    pub fn assign(
        &mut self,
        heap: &Heap,
        name: ObjRef,
        value: Value,
    ) -> std::result::Result<(), AssignError> {
        let hash = heap.str_hash(name);
        let mut index = Some(self.current);
        while let Some(i) = index {
            if let Some(existing) = self.envs[i].values.get(name, hash) {
                if let Value::Obj(r) = existing
                    && matches!(heap.get(r), Obj::Function(_) | Obj::Native(_))
                {
                    return Err(AssignError::Function);
                }
                match self.envs[i].values.set_existing(name, hash, value) {
                    SetResult::Updated => return Ok(()),
                    SetResult::Undefined => unreachable!("binding vanished mid-assignment"),
                }
            }
            index = self.envs[i].enclosing;
        }
        Err(AssignError::Undefined)
    }

    /// Every live environment table, outermost first. GC roots.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.envs.iter().map(|e| &e.values)
    }
}

impl Default for EnvStack {
    fn default() -> Self {
        EnvStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward_and_scopes_shadow() {
        let mut heap = Heap::new();
        let mut envs = EnvStack::new();
        let x = heap.intern("x");

        assert!(envs.define(&heap, x, Value::Number(1.0)));
        envs.begin_scope();
        assert_eq!(envs.get(&heap, x), Some(Value::Number(1.0)));

        assert!(envs.define(&heap, x, Value::Number(2.0)));
        assert_eq!(envs.get(&heap, x), Some(Value::Number(2.0)));

        envs.end_scope();
        assert_eq!(envs.get(&heap, x), Some(Value::Number(1.0)));
    }

    #[test]
    fn duplicate_definition_in_same_scope_fails() {
        let mut heap = Heap::new();
        let mut envs = EnvStack::new();
        let x = heap.intern("x");
        assert!(envs.define(&heap, x, Value::Null));
        assert!(!envs.define(&heap, x, Value::Null));
    }

    #[test]
    fn assignment_reaches_enclosing_scopes_but_not_missing_names() {
        let mut heap = Heap::new();
        let mut envs = EnvStack::new();
        let x = heap.intern("x");
        let y = heap.intern("y");

        envs.define(&heap, x, Value::Number(1.0));
        envs.begin_scope();
        assert_eq!(envs.assign(&heap, x, Value::Number(5.0)), Ok(()));
        assert_eq!(
            envs.assign(&heap, y, Value::Null),
            Err(AssignError::Undefined)
        );
        envs.end_scope();
        assert_eq!(envs.get(&heap, x), Some(Value::Number(5.0)));
    }

    #[test]
    fn call_environments_skip_caller_locals() {
        let mut heap = Heap::new();
        let mut envs = EnvStack::new();
        let global = heap.intern("global");
        let local = heap.intern("local");

        // Outermost scope plays the globals role here.
        envs.define(&heap, global, Value::Number(1.0));
        envs.begin_scope();
        envs.define(&heap, local, Value::Number(2.0));

        let snapshot = envs.enter_call(0);
        assert_eq!(envs.get(&heap, global), Some(Value::Number(1.0)));
        assert_eq!(envs.get(&heap, local), None);
        envs.restore(snapshot);

        assert_eq!(envs.get(&heap, local), Some(Value::Number(2.0)));
    }
}
