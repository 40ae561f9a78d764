//! Environment Variables
//!
//! The global name→value table. Entries keep an export flag and their
//! insertion order, so `set`/`export` listings are stable and the child
//! environment can be rebuilt for `exec`.

use std::io::{self, Write};

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct EnvVar {
    value: String,
    exported: bool,
}

/// Insertion-ordered environment table.
#[derive(Debug, Default)]
pub struct VarStore {
    vars: IndexMap<String, EnvVar>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipe the table and repopulate it from the external environment.
    /// Every imported entry is marked exported.
    pub fn import<I>(&mut self, env: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.vars.clear();
        for (key, value) in env {
            self.vars.insert(
                key,
                EnvVar {
                    value,
                    exported: true,
                },
            );
        }
    }

    /// Build `NAME=VAL` strings for the exported entries only, in order.
    pub fn export_strings(&self) -> Vec<String> {
        self.vars
            .iter()
            .filter(|(_, var)| var.exported)
            .map(|(key, var)| format!("{}={}", key, var.value))
            .collect()
    }

    /// Upsert a variable. The export flag of an existing entry is kept.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.vars.get_mut(key) {
            Some(var) => var.value = value.to_string(),
            None => {
                self.vars.insert(
                    key.to_string(),
                    EnvVar {
                        value: value.to_string(),
                        exported: false,
                    },
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|var| var.value.as_str())
    }

    /// Remove a variable, preserving the order of the remaining entries.
    pub fn delete(&mut self, key: &str) -> bool {
        self.vars.shift_remove(key).is_some()
    }

    /// Mark an existing variable as exported.
    pub fn set_export(&mut self, key: &str) -> bool {
        match self.vars.get_mut(key) {
            Some(var) => {
                var.exported = true;
                true
            }
            None => false,
        }
    }

    /// Print all variables in insertion order. With `exported_only`, each
    /// line gets an `export ` prefix and unexported entries are skipped.
    pub fn print_all<W: Write>(&self, out: &mut W, exported_only: bool) -> io::Result<()> {
        for (key, var) in &self.vars {
            if exported_only && !var.exported {
                continue;
            }

            if exported_only {
                write!(out, "export ")?;
            }
            writeln!(out, "{}={}", key, var.value)?;
        }

        Ok(())
    }
}

/// A valid identifier is `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
