//! Meta Commands
//!
//! Colon-prefixed commands handled inside the shell: context
//! manipulation, the on-disk store, and command re-injection. A handler
//! either finishes on its own or hands back a rewritten command string
//! for the dispatcher to parse and evaluate as fresh input.
//!
//! `:ctx` subcommands dispatch through hidden registry entries named
//! `:_ctx_*`; calling those directly works but earns a warning.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lazy_static::lazy_static;

use crate::errors::{self, MeshError};
use crate::shell::Shell;
use crate::store;

/// What a handler decided.
pub enum MetaAction {
    Done,
    /// Evaluate this string as a fresh program.
    Rewrite(String),
}

pub type MetaResult = Result<MetaAction, MeshError>;

type MetaFn = fn(&mut Shell, &[String]) -> MetaResult;

struct MetaCommand {
    func: MetaFn,
    hidden: bool,
}

impl MetaCommand {
    fn shown(func: MetaFn) -> Self {
        MetaCommand {
            func,
            hidden: false,
        }
    }

    fn hidden(func: MetaFn) -> Self {
        MetaCommand { func, hidden: true }
    }
}

lazy_static! {
    static ref REGISTRY: IndexMap<&'static str, MetaCommand> = {
        let mut table: IndexMap<&'static str, MetaCommand> = IndexMap::new();
        table.insert(":ctx", MetaCommand::shown(meta_ctx));
        table.insert(":c", MetaCommand::shown(meta_ctx));
        table.insert(":add", MetaCommand::shown(meta_add));
        table.insert(":a", MetaCommand::shown(meta_add));
        table.insert(":replace", MetaCommand::shown(meta_replace));
        table.insert(":r", MetaCommand::shown(meta_replace));
        table.insert(":store", MetaCommand::shown(meta_store));
        table.insert(":s", MetaCommand::shown(meta_store));
        table.insert(":asroot", MetaCommand::shown(meta_asroot));
        table.insert(":hcf", MetaCommand::shown(meta_hcf));
        table.insert(":_ctx_show", MetaCommand::hidden(meta_ctx_show));
        table.insert(":_ctx_set", MetaCommand::hidden(meta_ctx_set));
        table.insert(":_ctx_ls", MetaCommand::hidden(meta_ctx_ls));
        table.insert(":_ctx_make", MetaCommand::hidden(meta_ctx_make));
        table.insert(":_ctx_new", MetaCommand::hidden(meta_ctx_new));
        table.insert(":_ctx_del", MetaCommand::hidden(meta_ctx_del));
        table.insert(":_ctx_import", MetaCommand::hidden(meta_ctx_import));
        table.insert(":_ctx_export", MetaCommand::hidden(meta_ctx_export));
        table
    };
}

/// Look up and run a meta command. `argv[0]` is the full `:name`; a
/// numeric name is the row-fetch shortcut.
pub fn run_meta(shell: &mut Shell, argv: &[String]) -> MetaResult {
    let name = argv[0].as_str();

    if let Some(cmd) = REGISTRY.get(name) {
        if cmd.hidden {
            errors::warn("this command is not intended to be called directly from the shell");
        }
        return (cmd.func)(shell, argv);
    }

    // `:N` fetches row N of the current context as a rewrite
    let index: i32 = name[1..].parse().map_err(|_| {
        MeshError::general(format!("{}: meta command not found", &name[1..]))
    })?;
    let row = shell
        .contexts
        .get_row(index)
        .ok_or_else(|| MeshError::general("no such command in context"))?;

    Ok(MetaAction::Rewrite(row))
}

/// Read one line from the line reader, for `:add`/`:replace` without
/// inline text.
fn read_input_line() -> Result<String, MeshError> {
    let mut line = String::new();
    let n = io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| MeshError::general(format!("cannot read input: {}", e)))?;
    if n == 0 {
        return Err(MeshError::general("no input"));
    }
    Ok(line.trim_end_matches('\n').to_string())
}

/** Shown meta commands */

fn meta_ctx(shell: &mut Shell, argv: &[String]) -> MetaResult {
    // No arguments defaults to showing the current context
    if argv.len() == 1 {
        return meta_ctx_show(shell, &[":_ctx_show".to_string()]);
    }

    let sub_name = format!(":_ctx_{}", argv[1]);
    let sub = REGISTRY.get(sub_name.as_str()).ok_or_else(|| {
        MeshError::general(format!("ctx subcommand '{}' does not exist", argv[1]))
    })?;

    (sub.func)(shell, &argv[1..])
}

fn meta_add(shell: &mut Shell, argv: &[String]) -> MetaResult {
    let text = if argv.len() > 1 {
        argv[1..].join(" ")
    } else {
        read_input_line()?
    };

    shell.contexts.add_current(text)?;
    Ok(MetaAction::Done)
}

fn meta_replace(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() < 2 {
        return Err(MeshError::usage("replace requires a row index"));
    }

    let index: i32 = argv[1]
        .parse()
        .map_err(|_| MeshError::general("argument must be a row"))?;

    let text = if argv.len() > 2 {
        argv[2..].join(" ")
    } else {
        read_input_line()?
    };

    shell.contexts.replace_current(index, text)?;
    Ok(MetaAction::Done)
}

fn meta_asroot(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 2 {
        return Err(MeshError::usage("too many arguments"));
    }

    let index: i32 = match argv.get(1) {
        None => -1,
        Some(arg) => arg
            .parse()
            .map_err(|_| MeshError::general("argument must be a row"))?,
    };

    let row = shell
        .contexts
        .get_row(index)
        .ok_or_else(|| MeshError::general("no such command in context"))?;

    let root = shell
        .root_program()
        .ok_or_else(|| MeshError::general("cannot find doas or sudo on your system"))?;

    Ok(MetaAction::Rewrite(format!("{} {}", root, row)))
}

fn meta_hcf(shell: &mut Shell, _argv: &[String]) -> MetaResult {
    shell.fatal("halt and catch fire")
}

fn meta_store(shell: &mut Shell, argv: &[String]) -> MetaResult {
    let sub = argv
        .get(1)
        .ok_or_else(|| MeshError::usage("store requires a subcommand"))?;

    match sub.as_str() {
        "load" => {
            if argv.len() < 3 {
                return Err(MeshError::usage("load requires a name"));
            }
            store_load(shell, &argv[2..])
        }
        "save" => {
            if argv.len() < 3 {
                return Err(MeshError::usage("save requires a name"));
            }
            store_save(shell, &argv[2..])
        }
        "ls" => {
            let names: Vec<String> = shell
                .store
                .list(&shell.vars)
                .iter()
                .map(|item| item.name.clone())
                .collect();
            let mut out = io::stdout();
            for name in names {
                let _ = writeln!(out, "{}", name);
            }
            Ok(MetaAction::Done)
        }
        "edit" => {
            if argv.len() != 3 {
                return Err(MeshError::usage("edit requires a name"));
            }
            let item = shell.store.find(&argv[2], &shell.vars).ok_or_else(|| {
                MeshError::general(format!("'{}' not found in store", argv[2]))
            })?;
            let editor = shell
                .vars
                .get("EDITOR")
                .ok_or_else(|| MeshError::general("EDITOR is not set"))?;
            Ok(MetaAction::Rewrite(format!(
                "{} {}",
                editor,
                item.filename.display()
            )))
        }
        "reload" => {
            let dir = store::config_ctx_dir(&shell.vars)?;
            shell.store.reload(&dir)?;
            Ok(MetaAction::Done)
        }
        _ => Err(MeshError::general(format!(
            "store subcommand '{}' does not exist",
            sub
        ))),
    }
}

fn store_load(shell: &mut Shell, names: &[String]) -> MetaResult {
    let mut has_error = false;

    for name in names {
        let Some(item) = shell.store.find(name, &shell.vars) else {
            errors::error(&format!("'{}' not found in store", name));
            has_error = true;
            continue;
        };

        match store::read_context_file(&item.filename) {
            Ok((_, ctx)) => match shell.contexts.insert(&item.name, ctx) {
                Ok(()) => println!("loaded context '{}'", item.name),
                Err(err) => {
                    errors::report(&err);
                    has_error = true;
                }
            },
            Err(err) => {
                errors::report(&err);
                has_error = true;
            }
        }
    }

    if has_error {
        Err(MeshError::Reported)
    } else {
        Ok(MetaAction::Done)
    }
}

fn store_save(shell: &mut Shell, names: &[String]) -> MetaResult {
    let dir = store::config_ctx_dir(&shell.vars)?;
    store::mkdir_p(&dir)?;

    let mut has_error = false;
    for name in names {
        let Some(ctx) = shell.contexts.get(name).cloned() else {
            errors::error(&format!("context '{}' not found", name));
            has_error = true;
            continue;
        };

        let path = dir.join(format!("{}.ctx", name));
        match store::write_context_file(&path, name, &ctx) {
            Ok(()) => println!("saved context '{}'", name),
            Err(err) => {
                errors::report(&err);
                has_error = true;
            }
        }
    }

    if has_error {
        Err(MeshError::Reported)
    } else {
        Ok(MetaAction::Done)
    }
}

/** Hidden meta commands */

fn meta_ctx_show(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 2 {
        return Err(MeshError::usage("too many arguments"));
    }

    let (name, ctx) = if argv.len() == 2 {
        let ctx = shell.contexts.get(&argv[1]).ok_or_else(|| {
            MeshError::general(format!("context '{}' not found", argv[1]))
        })?;
        (argv[1].as_str(), ctx)
    } else {
        shell
            .contexts
            .current()
            .ok_or_else(|| MeshError::general("context is not set"))?
    };

    let mut out = io::stdout();
    let _ = writeln!(out, "Context name: {}\n", name);
    for (i, command) in ctx.commands.iter().enumerate() {
        let _ = writeln!(out, "{}: {}", i, command);
    }

    Ok(MetaAction::Done)
}

fn meta_ctx_set(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 2 {
        return Err(MeshError::usage("too many arguments"));
    }
    if argv.len() < 2 {
        return Err(MeshError::general("context not specified"));
    }

    if !shell.contexts.select(&argv[1]) {
        return Err(MeshError::general(format!(
            "context '{}' not found",
            argv[1]
        )));
    }

    println!("switched to '{}'", argv[1]);
    Ok(MetaAction::Done)
}

fn meta_ctx_ls(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 1 {
        return Err(MeshError::usage("too many arguments"));
    }

    let current = shell.contexts.current_name().map(|n| n.to_string());
    let mut out = io::stdout();
    for (name, _) in shell.contexts.iter() {
        if current.as_deref() == Some(name) {
            let _ = writeln!(out, "{} (selected)", name);
        } else {
            let _ = writeln!(out, "{}", name);
        }
    }

    Ok(MetaAction::Done)
}

fn meta_ctx_make(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 2 {
        return Err(MeshError::usage("too many arguments"));
    }
    if argv.len() < 2 {
        return Err(MeshError::general("new context requires a name"));
    }

    shell.contexts.create(&argv[1])?;
    println!("created new context '{}'", argv[1]);
    Ok(MetaAction::Done)
}

fn meta_ctx_new(shell: &mut Shell, argv: &[String]) -> MetaResult {
    meta_ctx_make(shell, argv)?;
    meta_ctx_set(shell, argv)?;
    Ok(MetaAction::Done)
}

fn meta_ctx_del(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 2 {
        return Err(MeshError::usage("too many arguments"));
    }
    if argv.len() < 2 {
        return Err(MeshError::general("context not specified"));
    }

    shell
        .contexts
        .delete(&argv[1])
        .map_err(|_| MeshError::general(format!("failed to delete '{}'", argv[1])))?;

    println!("context '{}' deleted", argv[1]);
    Ok(MetaAction::Done)
}

fn meta_ctx_import(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() < 2 {
        return Err(MeshError::usage("import requires a file"));
    }

    let mut has_error = false;
    for file in &argv[1..] {
        match store::read_context_file(Path::new(file)) {
            Err(err) => {
                errors::report(&err);
                has_error = true;
            }
            Ok((declared, ctx)) => {
                let name = declared.unwrap_or_else(|| {
                    Path::new(file)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.clone())
                });

                if name.starts_with('_') {
                    errors::error(&format!("'{}' has a reserved name", name));
                    has_error = true;
                    continue;
                }

                match shell.contexts.insert(&name, ctx) {
                    Ok(()) => println!("imported context '{}'", name),
                    Err(err) => {
                        errors::report(&err);
                        has_error = true;
                    }
                }
            }
        }
    }

    if has_error {
        Err(MeshError::Reported)
    } else {
        Ok(MetaAction::Done)
    }
}

fn meta_ctx_export(shell: &mut Shell, argv: &[String]) -> MetaResult {
    if argv.len() > 3 {
        return Err(MeshError::usage("too many arguments"));
    }

    let name = match argv.get(1) {
        Some(n) => n.clone(),
        None => shell
            .contexts
            .current_name()
            .ok_or_else(|| MeshError::general("context is not set"))?
            .to_string(),
    };

    let ctx = shell
        .contexts
        .get(&name)
        .cloned()
        .ok_or_else(|| MeshError::general(format!("context '{}' not found", name)))?;

    let path = match argv.get(2) {
        Some(file) => PathBuf::from(file),
        None => {
            let dir = store::config_ctx_dir(&shell.vars)?;
            store::mkdir_p(&dir)?;
            dir.join(format!("{}.ctx", name))
        }
    };

    store::write_context_file(&path, &name, &ctx)?;
    println!("exported context '{}' to '{}'", name, path.display());
    Ok(MetaAction::Done)
}
