//! Native REPL for manual smoke-testing of the shell core outside a
//! browser. Thin: all behavior lives in `moodang_core::shell::Shell`.

use std::io::{self, Write};

use moodang_core::environment::ShellOptions;
use moodang_core::shell::Shell;

fn main() {
    let mut shell = Shell::new(ShellOptions::main_shell());
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("$ ");
        let _ = io::stdout().flush();
        line.clear();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" {
            break;
        }

        let result = shell.execute_line(trimmed);
        if !result.stdout.is_empty() {
            println!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr);
        }
    }
}
