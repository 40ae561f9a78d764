//! Context Registry
//!
//! A context is a named, ordered list of command strings. The registry
//! keeps contexts in insertion order, tracks which one is current, and
//! owns the reserved `history` context that exists from startup.
//! Evaluated lines are recorded into the current context; meta rewrites
//! go to `history`.

use indexmap::IndexMap;

use crate::errors::MeshError;

/// Name of the context that always exists after startup.
pub const HISTORY: &str = "history";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub commands: Vec<String>,
}

#[derive(Debug)]
pub struct ContextRegistry {
    contexts: IndexMap<String, Context>,
    current: Option<String>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    /// Create the registry with the `history` context present and current.
    pub fn new() -> Self {
        let mut contexts = IndexMap::new();
        contexts.insert(HISTORY.to_string(), Context::default());
        ContextRegistry {
            contexts,
            current: Some(HISTORY.to_string()),
        }
    }

    pub fn create(&mut self, name: &str) -> Result<(), MeshError> {
        if self.contexts.contains_key(name) {
            return Err(MeshError::general("context already exists"));
        }
        self.contexts.insert(name.to_string(), Context::default());
        Ok(())
    }

    /// Insert a pre-filled context (store load, file import).
    pub fn insert(&mut self, name: &str, ctx: Context) -> Result<(), MeshError> {
        if self.contexts.contains_key(name) {
            return Err(MeshError::general("context already exists"));
        }
        self.contexts.insert(name.to_string(), ctx);
        Ok(())
    }

    /// Delete a context. If it was current, no context is current after.
    pub fn delete(&mut self, name: &str) -> Result<(), MeshError> {
        if self.contexts.shift_remove(name).is_none() {
            return Err(MeshError::general(format!("context '{}' not found", name)));
        }
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Ok(())
    }

    pub fn select(&mut self, name: &str) -> bool {
        if self.contexts.contains_key(name) {
            self.current = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<(&str, &Context)> {
        let name = self.current.as_deref()?;
        self.contexts.get(name).map(|ctx| (name, ctx))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Context)> {
        self.contexts.iter().map(|(name, ctx)| (name.as_str(), ctx))
    }

    /// Fetch a row of the current context. Negative indices count from
    /// the end (`-1` is the most recent entry).
    pub fn get_row(&self, index: i32) -> Option<String> {
        let (_, ctx) = self.current()?;
        let len = ctx.commands.len() as i64;
        let abs = if index < 0 {
            len + index as i64
        } else {
            index as i64
        };
        if abs < 0 || abs >= len {
            return None;
        }
        Some(ctx.commands[abs as usize].clone())
    }

    /// Append a command to the current context.
    pub fn add_current(&mut self, command: String) -> Result<(), MeshError> {
        let name = self
            .current
            .clone()
            .ok_or_else(|| MeshError::general("context is not set"))?;
        if let Some(ctx) = self.contexts.get_mut(&name) {
            ctx.commands.push(command);
        }
        Ok(())
    }

    /// Replace a row of the current context; negative indices count from
    /// the end.
    pub fn replace_current(&mut self, index: i32, command: String) -> Result<(), MeshError> {
        let name = self
            .current
            .clone()
            .ok_or_else(|| MeshError::general("context is not set"))?;
        let ctx = self
            .contexts
            .get_mut(&name)
            .ok_or_else(|| MeshError::general("context is not set"))?;

        let len = ctx.commands.len() as i64;
        let abs = if index < 0 {
            len + index as i64
        } else {
            index as i64
        };
        if abs < 0 || abs >= len {
            return Err(MeshError::general("index is out of bounds"));
        }

        ctx.commands[abs as usize] = command;
        Ok(())
    }

    /// Record an evaluated line. Goes to the current context, falling
    /// back to `history` when nothing is selected.
    pub fn record(&mut self, line: &str) {
        let name = self
            .current
            .clone()
            .unwrap_or_else(|| HISTORY.to_string());
        if let Some(ctx) = self.contexts.get_mut(&name) {
            ctx.commands.push(line.to_string());
        }
    }

    /// Append a meta rewrite to the `history` context.
    pub fn hist_add(&mut self, line: &str) {
        if let Some(ctx) = self.contexts.get_mut(HISTORY) {
            ctx.commands.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_present_and_current_at_startup() {
        let reg = ContextRegistry::new();
        assert!(reg.get(HISTORY).is_some());
        assert_eq!(reg.current_name(), Some(HISTORY));
    }

    #[test]
    fn test_create_select_delete() {
        let mut reg = ContextRegistry::new();
        reg.create("work").unwrap();
        assert!(reg.create("work").is_err());

        assert!(reg.select("work"));
        assert_eq!(reg.current_name(), Some("work"));
        assert!(!reg.select("missing"));

        reg.delete("work").unwrap();
        assert_eq!(reg.current_name(), None);
        assert!(reg.delete("work").is_err());
    }

    #[test]
    fn test_delete_other_context_keeps_current() {
        let mut reg = ContextRegistry::new();
        reg.create("a").unwrap();
        reg.create("b").unwrap();
        reg.select("a");
        reg.delete("b").unwrap();
        assert_eq!(reg.current_name(), Some("a"));
    }

    #[test]
    fn test_rows_and_negative_indexing() {
        let mut reg = ContextRegistry::new();
        reg.create("t").unwrap();
        reg.select("t");
        reg.add_current("first".into()).unwrap();
        reg.add_current("second".into()).unwrap();

        assert_eq!(reg.get_row(0).as_deref(), Some("first"));
        assert_eq!(reg.get_row(1).as_deref(), Some("second"));
        assert_eq!(reg.get_row(-1).as_deref(), Some("second"));
        assert_eq!(reg.get_row(-2).as_deref(), Some("first"));
        assert_eq!(reg.get_row(2), None);
        assert_eq!(reg.get_row(-3), None);
    }

    #[test]
    fn test_replace() {
        let mut reg = ContextRegistry::new();
        reg.create("t").unwrap();
        reg.select("t");
        reg.add_current("one".into()).unwrap();
        reg.add_current("two".into()).unwrap();

        reg.replace_current(-1, "TWO".into()).unwrap();
        assert_eq!(reg.get_row(1).as_deref(), Some("TWO"));
        reg.replace_current(0, "ONE".into()).unwrap();
        assert_eq!(reg.get_row(0).as_deref(), Some("ONE"));
        assert!(reg.replace_current(5, "x".into()).is_err());
    }

    #[test]
    fn test_record_falls_back_to_history() {
        let mut reg = ContextRegistry::new();
        reg.create("t").unwrap();
        reg.select("t");
        reg.record("in t");
        assert_eq!(reg.get("t").unwrap().commands, vec!["in t"]);

        reg.delete("t").unwrap();
        reg.record("orphan");
        assert_eq!(reg.get(HISTORY).unwrap().commands, vec!["orphan"]);
    }

    #[test]
    fn test_add_without_current_errors() {
        let mut reg = ContextRegistry::new();
        reg.delete(HISTORY).unwrap();
        assert!(reg.add_current("x".into()).is_err());
        assert!(reg.replace_current(0, "x".into()).is_err());
        assert_eq!(reg.get_row(0), None);
    }
}
