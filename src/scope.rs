//! Scope Frames
//!
//! A LIFO stack of lexical frames layered over the environment table.
//! Each frame holds named variables and positional parameters; the
//! reversible flag engine pushes a frame before running an in-process
//! command and pops it afterwards, so scoped assignments never touch the
//! parent state.

use indexmap::IndexMap;

use crate::errors::MeshError;

#[derive(Debug, Default)]
struct Frame {
    named: IndexMap<String, String>,
    positionals: Vec<String>,
}

impl Frame {
    fn new() -> Self {
        let mut frame = Frame::default();
        // `#` is present in every frame, even with no positionals
        frame.named.insert("#".to_string(), "0".to_string());
        frame
    }
}

/// Stack of scope frames. The bottom frame is the top-level shell scope
/// and can never be popped.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![Frame::new()],
        }
    }

    fn top(&self) -> &Frame {
        self.frames.last().unwrap()
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    /// Set a named variable in the top frame.
    pub fn set(&mut self, key: &str, value: &str) {
        self.top_mut()
            .named
            .insert(key.to_string(), value.to_string());
    }

    /// Look up a named variable in the top frame only.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.top().named.get(key).map(|v| v.as_str())
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.top_mut().named.shift_remove(key).is_some()
    }

    /// Append a positional parameter (1-indexed) and refresh `@` and `#`.
    pub fn append_pos(&mut self, value: &str) {
        self.top_mut().positionals.push(value.to_string());

        let joined = self.list_pos();
        let count = self.pos_count().to_string();
        let frame = self.top_mut();
        frame.named.insert("@".to_string(), joined);
        frame.named.insert("#".to_string(), count);
    }

    /// Get the n-th positional parameter, 1-indexed.
    pub fn get_pos(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.top().positionals.get(index - 1).map(|v| v.as_str())
    }

    /// All positionals joined by single spaces; empty when there are none.
    pub fn list_pos(&self) -> String {
        self.top().positionals.join(" ")
    }

    pub fn pos_count(&self) -> usize {
        self.top().positionals.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pop the top frame and drop everything it owns. Refuses to pop the
    /// bottom frame.
    pub fn pop_frame(&mut self) -> Result<(), MeshError> {
        if self.frames.len() <= 1 {
            return Err(MeshError::general("cannot delete top-level scope"));
        }

        self.frames.pop();
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
