use std::io::{self, BufRead, Write};
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use mesh::errors;
use mesh::Shell;

#[derive(Parser)]
#[command(name = "mesh")]
#[command(about = "A command shell with named command contexts")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version information and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Evaluate a command string
    #[arg(short = 'c', value_name = "STRING")]
    command: Option<String>,

    /// Script file followed by positional parameters
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    let argv0 = std::env::args().next().unwrap_or_else(|| "mesh".to_string());

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            let _ = err.print();
            process::exit(0);
        }
        Err(_) => {
            errors::error("invalid argument");
            process::exit(1);
        }
    };

    if cli.version {
        println!("mesh version {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    let mut shell = Shell::new(&argv0);

    // -c STRING: trailing args become $1..$N
    if let Some(command) = cli.command {
        for arg in &cli.args {
            shell.scopes.append_pos(arg);
        }
        process::exit(shell.process_line(&command));
    }

    // Script file with positionals
    if let Some((file, positionals)) = cli.args.split_first() {
        for arg in positionals {
            shell.scopes.append_pos(arg);
        }
        let file = file.clone();
        process::exit(run_script(&mut shell, &file));
    }

    run_interactive(&mut shell);
}

/// Execute a script file line by line; the script's status is the
/// status of its last line.
fn run_script(shell: &mut Shell, filename: &str) -> i32 {
    let content = match std::fs::read_to_string(filename) {
        Ok(content) => content,
        Err(err) => {
            errors::error(&format!("failed to open file: {}", err));
            return 1;
        }
    };

    let mut status = 0;
    for line in content.lines() {
        status = shell.process_line(line);
    }
    status
}

/// The interactive loop: render the prompt, read a line, evaluate.
/// SIGINT and SIGQUIT are ignored by the shell itself; forked children
/// restore the defaults before exec.
fn run_interactive(shell: &mut Shell) -> ! {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_IGN);
        libc::signal(libc::SIGQUIT, libc::SIG_IGN);
    }

    loop {
        let prompt = shell.vars.get("PS1").unwrap_or("$ ").to_string();
        print!("{}", prompt);
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => {
                // EOF: finish the line and leave
                println!();
                process::exit(0);
            }
            Ok(_) => {
                shell.process_line(&line);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                shell.set_status(2);
                println!();
            }
            Err(_) => {
                errors::error("cannot read commands from this source");
                process::exit(1);
            }
        }
    }
}
