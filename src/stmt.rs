//! The process-wide prepared-statement registry.

use crate::hint::Hint;
use crate::myc::constants::ColumnType;
use crate::myc::value::Value;
use crate::ParsedStatement;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Mutable bind state of a prepared statement.
///
/// Only the connection that prepared the statement (and the executor it
/// calls) ever touches this; the mutex exists because descriptors are handed
/// out as `Arc`s, not because of cross-connection sharing.
pub struct BindState {
    /// Parameter types, filled by the first execute that carries the
    /// new-params-bound flag. Always `params_count` long; the `bool` is the
    /// unsigned flag.
    pub params_type: Vec<(ColumnType, bool)>,
    /// Bind variables keyed positionally (`"v1"`, `"v2"`, …). A fresh map
    /// after every execute and reset.
    pub bind_vars: HashMap<String, Value>,
}

/// A prepared statement owned by the registry.
pub struct Statement {
    id: u32,
    sql: String,
    params_count: u16,
    hints: Vec<Hint>,
    ast: Box<dyn ParsedStatement>,
    bind: Mutex<BindState>,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("params_count", &self.params_count)
            .field("hints", &self.hints)
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// Build a descriptor for `sql`.
    ///
    /// Placeholders are counted as verbatim `?` occurrences in the raw text,
    /// so a `?` inside a quoted literal or comment counts too.
    pub fn new(id: u32, sql: String, hints: Vec<Hint>, ast: Box<dyn ParsedStatement>) -> Self {
        let params_count = sql.matches('?').count() as u16;
        let bind = BindState {
            params_type: vec![(ColumnType::MYSQL_TYPE_DECIMAL, false); params_count as usize],
            bind_vars: HashMap::with_capacity(params_count as usize),
        };
        Statement {
            id,
            sql,
            params_count,
            hints,
            ast,
            bind: Mutex::new(bind),
        }
    }

    /// The registry-assigned statement id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The raw SQL text as prepared.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders.
    pub fn params_count(&self) -> u16 {
        self.params_count
    }

    /// Hints parsed at prepare time, in source order.
    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    /// The opaque parsed statement from the parser collaborator.
    pub fn ast(&self) -> &dyn ParsedStatement {
        &*self.ast
    }

    /// Lock the bind state for type fills and value binds.
    pub fn bind_state(&self) -> MutexGuard<'_, BindState> {
        self.bind.lock()
    }

    /// Install a fresh bind-variable map sized for the statement's
    /// parameters. Runs after every execute so the executor can mutate bind
    /// variables freely without leaking state into the next execute.
    pub(crate) fn reset_bind_vars(&self) {
        self.bind.lock().bind_vars = HashMap::with_capacity(self.params_count as usize);
    }

    /// Replace the bind variables with an empty, unsized map (COM_STMT_RESET).
    pub(crate) fn clear_bind_vars(&self) {
        self.bind.lock().bind_vars = HashMap::new();
    }
}

/// Process-wide map of statement id to descriptor.
///
/// Ids are unique for the process lifetime; per-key operations are
/// linearizable. Descriptors come back as `Arc`s so handlers and command
/// contexts can hold them across collaborator calls.
pub struct StatementRegistry {
    next: AtomicU32,
    stmts: DashMap<u32, Arc<Statement>>,
}

impl StatementRegistry {
    /// An empty registry with the id counter at zero.
    pub fn new() -> Self {
        StatementRegistry {
            next: AtomicU32::new(0),
            stmts: DashMap::new(),
        }
    }

    /// Allocate the next statement id. Strictly monotonic.
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a descriptor under its id.
    pub fn store(&self, stmt: Statement) -> Arc<Statement> {
        let stmt = Arc::new(stmt);
        self.stmts.insert(stmt.id(), Arc::clone(&stmt));
        stmt
    }

    /// Look up a descriptor.
    pub fn load(&self, id: u32) -> Option<Arc<Statement>> {
        self.stmts.get(&id).map(|e| Arc::clone(&e))
    }

    /// Drop a descriptor (COM_STMT_CLOSE).
    pub fn remove(&self, id: u32) -> Option<Arc<Statement>> {
        self.stmts.remove(&id).map(|(_, s)| s)
    }

    /// Number of live descriptors.
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Whether no statements are prepared.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl Default for StatementRegistry {
    fn default() -> Self {
        StatementRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl ParsedStatement for Bare {
        fn hints(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn stmt(id: u32, sql: &str) -> Statement {
        Statement::new(id, sql.to_owned(), Vec::new(), Box::new(Bare))
    }

    #[test]
    fn ids_are_strictly_monotonic_across_threads() {
        let reg = Arc::new(StatementRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let reg = Arc::clone(&reg);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| reg.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn placeholders_are_counted_verbatim() {
        let s = stmt(1, "SELECT ?, ?+?");
        assert_eq!(s.params_count(), 3);
        assert_eq!(s.bind_state().params_type.len(), 3);

        // raw substring count: quoted placeholders count too
        let s = stmt(2, "SELECT '?' FROM t WHERE a = ?");
        assert_eq!(s.params_count(), 2);
    }

    #[test]
    fn store_load_remove() {
        let reg = StatementRegistry::new();
        let id = reg.next_id();
        reg.store(stmt(id, "SELECT 1"));
        assert!(reg.load(id).is_some());
        assert!(reg.remove(id).is_some());
        assert!(reg.load(id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn reset_installs_sized_map() {
        let s = stmt(1, "SELECT ? + ?");
        s.bind_state()
            .bind_vars
            .insert("v1".to_owned(), Value::Int(1));
        s.reset_bind_vars();
        let state = s.bind_state();
        assert!(state.bind_vars.is_empty());
        assert!(state.bind_vars.capacity() >= 2);
    }
}
