//! Context Store
//!
//! Serialized contexts live under `$HOME/.config/mesh/ctx/`, one file
//! per context. A file starts with a `#:name <name>` directive followed
//! by one command per line; blank lines and `#` comments are ignored.
//! The directory is scanned lazily and re-scanned on `:store reload`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::errors::{self, MeshError};
use crate::vars::VarStore;

const NAME_DIRECTIVE: &str = "#:name ";
const STORE_SUBDIR: &str = ".config/mesh/ctx";

/// One discovered store entry: a file and the context name it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub filename: PathBuf,
    pub name: String,
}

/// Lazily scanned view of the on-disk store directory.
#[derive(Debug, Default)]
pub struct Store {
    items: Option<Vec<StoreItem>>,
}

/// Store directory under the user's home.
pub fn config_ctx_dir(vars: &VarStore) -> Result<PathBuf, MeshError> {
    let home = vars
        .get("HOME")
        .ok_or_else(|| MeshError::general("HOME is not set"))?;
    Ok(Path::new(home).join(STORE_SUBDIR))
}

/// `mkdir -p` with mode 0755.
pub fn mkdir_p(path: &Path) -> Result<(), MeshError> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|e| MeshError::general(format!("cannot create '{}': {}", path.display(), e)))
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-scan a store directory, replacing the cached list. Files with a
    /// bad header or a reserved name are reported and skipped.
    pub fn reload(&mut self, dir: &Path) -> Result<(), MeshError> {
        let mut items = Vec::new();
        let mut has_error = false;

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.items = Some(Vec::new());
                return Err(MeshError::general(format!(
                    "cannot open '{}': {}",
                    dir.display(),
                    e
                )));
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            match peek_declared_name(&path) {
                Some(name) if name.starts_with('_') => {
                    errors::error(&format!(
                        "'{}' has a reserved name. skipping...",
                        path.display()
                    ));
                    has_error = true;
                }
                Some(name) => items.push(StoreItem {
                    filename: path,
                    name,
                }),
                None => {
                    errors::error(&format!(
                        "'{}' has a bad header. skipping...",
                        path.display()
                    ));
                    has_error = true;
                }
            }
        }

        self.items = Some(items);
        if has_error {
            Err(MeshError::Reported)
        } else {
            Ok(())
        }
    }

    fn ensure_loaded(&mut self, vars: &VarStore) {
        if self.items.is_some() {
            return;
        }

        match config_ctx_dir(vars) {
            Ok(dir) => {
                if let Err(err) = self.reload(&dir) {
                    errors::report(&err);
                }
            }
            Err(err) => {
                errors::report(&err);
                self.items = Some(Vec::new());
            }
        }
    }

    pub fn find(&mut self, name: &str, vars: &VarStore) -> Option<StoreItem> {
        self.ensure_loaded(vars);
        self.items
            .as_ref()?
            .iter()
            .find(|item| item.name == name)
            .cloned()
    }

    pub fn list(&mut self, vars: &VarStore) -> &[StoreItem] {
        self.ensure_loaded(vars);
        self.items.as_deref().unwrap_or(&[])
    }
}

/// Read just the first line of a file and extract the declared name.
fn peek_declared_name(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;
    let line = first_line.trim_end_matches('\n');
    line.strip_prefix(NAME_DIRECTIVE)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Parse a context file: optional leading `#:name` directive, then one
/// command per line. Whitespace is trimmed; blanks and comments ignored.
pub fn read_context_file(path: &Path) -> Result<(Option<String>, Context), MeshError> {
    let file = File::open(path)
        .map_err(|e| MeshError::general(format!("cannot open '{}': {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut declared = None;
    let mut commands = Vec::new();
    let mut first = true;

    for line in reader.lines() {
        let line = line
            .map_err(|e| MeshError::general(format!("cannot read '{}': {}", path.display(), e)))?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if first {
            first = false;
            if let Some(name) = trimmed.strip_prefix(NAME_DIRECTIVE) {
                let name = name.trim();
                if !name.is_empty() {
                    declared = Some(name.to_string());
                    continue;
                }
            }
        }

        if trimmed.starts_with('#') {
            continue;
        }

        commands.push(trimmed.to_string());
    }

    Ok((declared, Context { commands }))
}

/// Write a context in the store format.
pub fn write_context_file(path: &Path, name: &str, ctx: &Context) -> Result<(), MeshError> {
    let mut file = File::create(path)
        .map_err(|e| MeshError::general(format!("cannot write '{}': {}", path.display(), e)))?;

    let mut body = format!("{}{}\n", NAME_DIRECTIVE, name);
    for command in &ctx.commands {
        body.push_str(command);
        body.push('\n');
    }

    file.write_all(body.as_bytes())
        .map_err(|e| MeshError::general(format!("cannot write '{}': {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("work.ctx");
        let ctx = Context {
            commands: vec!["echo one".to_string(), "make all".to_string()],
        };

        write_context_file(&path, "work", &ctx).unwrap();
        let (declared, loaded) = read_context_file(&path).unwrap();

        assert_eq!(declared.as_deref(), Some("work"));
        assert_eq!(loaded, ctx);
    }

    #[test]
    fn test_read_skips_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.ctx");
        fs::write(
            &path,
            "#:name demo\n\n  echo hi  \n# a comment\nls -l\n",
        )
        .unwrap();

        let (declared, ctx) = read_context_file(&path).unwrap();
        assert_eq!(declared.as_deref(), Some("demo"));
        assert_eq!(ctx.commands, vec!["echo hi", "ls -l"]);
    }

    #[test]
    fn test_read_without_directive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, "echo a\necho b\n").unwrap();

        let (declared, ctx) = read_context_file(&path).unwrap();
        assert_eq!(declared, None);
        assert_eq!(ctx.commands, vec!["echo a", "echo b"]);
    }

    #[test]
    fn test_reload_scans_valid_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ctx"), "#:name alpha\necho a\n").unwrap();
        fs::write(dir.path().join("b.ctx"), "#:name beta\n").unwrap();
        // Bad header and reserved name are skipped
        fs::write(dir.path().join("bad.ctx"), "echo no header\n").unwrap();
        fs::write(dir.path().join("res.ctx"), "#:name _hidden\n").unwrap();

        let mut store = Store::new();
        assert!(store.reload(dir.path()).is_err());

        let vars = VarStore::new();
        let mut names: Vec<_> = store.list(&vars).iter().map(|i| i.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(store.find("alpha", &vars).is_some());
        assert!(store.find("_hidden", &vars).is_none());
    }

    #[test]
    fn test_reload_missing_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut store = Store::new();
        assert!(store.reload(&missing).is_err());

        let vars = VarStore::new();
        assert!(store.list(&vars).is_empty());
    }

    #[test]
    fn test_mkdir_p() {
        let dir = tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        mkdir_p(&deep).unwrap();
        assert!(deep.is_dir());
        // Existing directory is fine
        mkdir_p(&deep).unwrap();
    }
}
