//! Built-in command implementations.
//!
//! Flag parsing (scanning each argument for a leading `-`) and variable
//! name validation (`[A-Za-z_][A-Za-z0-9_]*`, ASCII only) follow the same
//! approach as other shells of this kind; `is_valid_var_name` lives in
//! `environment` and is shared rather than redefined here.

use std::collections::HashMap;
use std::rc::Rc;

use super::{Command, CommandHost, CommandOutcome, Registry};
use crate::environment::is_valid_var_name;
use crate::process::ExecutionContext;
use crate::vfs::EntryType;

pub fn all() -> Vec<Rc<dyn Command>> {
    vec![
        Rc::new(Echo),
        Rc::new(Pwd),
        Rc::new(Ls),
        Rc::new(Cat),
        Rc::new(Grep),
        Rc::new(Cd),
        Rc::new(Clear),
        Rc::new(Env),
        Rc::new(Export),
        Rc::new(Printenv),
        Rc::new(Unset),
        Rc::new(Which),
        Rc::new(Source),
        Rc::new(Help),
    ]
}

struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Write arguments to stdout"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, _host: &mut dyn CommandHost) -> CommandOutcome {
        CommandOutcome::ok(args.join(" "))
    }
}

struct Pwd;

impl Command for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }
    fn description(&self) -> &str {
        "Print the working directory"
    }
    fn execute(&self, _args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        CommandOutcome::ok(host.env().working_directory().to_string())
    }
}

struct Cd;

impl Command for Cd {
    fn name(&self) -> &str {
        "cd"
    }
    fn description(&self) -> &str {
        "Change the working directory"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        let target = match args.first() {
            None => host.env().get_variable("HOME").cloned().unwrap_or_else(|| "/".to_string()),
            Some(p) if p == "~" => host.env().get_variable("HOME").cloned().unwrap_or_else(|| "/".to_string()),
            Some(p) => p.clone(),
        };
        match host.change_directory(&target) {
            Ok(_) => CommandOutcome::ok(""),
            Err(e) => CommandOutcome::failure(format!("cd: {}", e), 1),
        }
    }
}

struct Ls;

fn format_mtime(ms: f64) -> String {
    const MONTH_NAMES: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let total_seconds = (ms / 1000.0).floor() as i64;
    let days = total_seconds.div_euclid(86_400);
    let secs_of_day = total_seconds.rem_euclid(86_400);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;

    // Howard Hinnant's civil_from_days, days since 1970-01-01.
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as usize;
    let _year = if month <= 2 { y + 1 } else { y };

    format!(
        "{} {:2} {:02}:{:02}",
        MONTH_NAMES[month - 1],
        day,
        hour,
        minute
    )
}

impl Command for Ls {
    fn name(&self) -> &str {
        "ls"
    }
    fn description(&self) -> &str {
        "List directory contents"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        let mut long = false;
        let mut all = false;
        let mut paths = Vec::new();
        for arg in args {
            if let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty()) {
                for c in flags.chars() {
                    match c {
                        'l' => long = true,
                        'a' => all = true,
                        _ => {}
                    }
                }
            } else {
                paths.push(arg.clone());
            }
        }
        let path = paths.first().cloned().unwrap_or_else(|| ".".to_string());
        let cwd = host.env().working_directory().to_string();

        if !long {
            match host.vfs().list_directory(&cwd, &path) {
                Ok(names) => {
                    let visible: Vec<&String> = names
                        .iter()
                        .filter(|n| all || !n.starts_with('.'))
                        .collect();
                    CommandOutcome::ok(
                        visible.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n"),
                    )
                }
                Err(e) => CommandOutcome::failure(format!("ls: {}", e), 1),
            }
        } else {
            match host.vfs().detailed_listing(&cwd, &path) {
                Ok(entries) => {
                    let visible: Vec<_> = entries
                        .into_iter()
                        .filter(|e| all || !e.name.starts_with('.'))
                        .collect();
                    let total_kb: u64 = visible.iter().map(|e| e.size.div_ceil(1024)).sum();
                    let mut lines = vec![format!("total {}", total_kb)];
                    for entry in visible {
                        let type_char = match entry.entry_type {
                            EntryType::Directory => 'd',
                            EntryType::File => '-',
                        };
                        lines.push(format!(
                            "{}{} 1 user user {:>8} {} {}",
                            type_char,
                            &entry.permissions[1..],
                            entry.size,
                            format_mtime(entry.modified),
                            entry.name
                        ));
                    }
                    CommandOutcome::ok(lines.join("\n"))
                }
                Err(e) => CommandOutcome::failure(format!("ls: {}", e), 1),
            }
        }
    }
}

struct Cat;

impl Command for Cat {
    fn name(&self) -> &str {
        "cat"
    }
    fn description(&self) -> &str {
        "Concatenate files to stdout"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            return CommandOutcome::failure("cat: missing file operand", 1);
        }
        let cwd = host.env().working_directory().to_string();
        let mut out = String::new();
        for path in args {
            match host.vfs().read_file(&cwd, path) {
                Ok(content) => out.push_str(&content),
                Err(_) => {
                    return CommandOutcome::failure(format!("cat: {}: No such file or directory", path), 1);
                }
            }
        }
        CommandOutcome::ok(out)
    }
}

struct Grep;

impl Command for Grep {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Print lines matching a substring"
    }
    fn execute(&self, args: &[String], ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        let Some(pattern) = args.first() else {
            return CommandOutcome::failure("grep: missing pattern", 1);
        };
        let files = &args[1..];
        let input = if files.is_empty() {
            ctx.stdin.clone()
        } else {
            let cwd = host.env().working_directory().to_string();
            let mut combined = String::new();
            for path in files {
                match host.vfs().read_file(&cwd, path) {
                    Ok(content) => combined.push_str(&content),
                    Err(_) => return CommandOutcome::failure(format!("grep: {}: No such file or directory", path), 1),
                }
            }
            combined
        };

        let matches: Vec<&str> = input.lines().filter(|line| line.contains(pattern.as_str())).collect();
        if matches.is_empty() {
            CommandOutcome::failure(String::new(), 1)
        } else {
            let mut out: String = matches.join("\n");
            out.push('\n');
            CommandOutcome::ok(out)
        }
    }
}

struct Clear;

impl Command for Clear {
    fn name(&self) -> &str {
        "clear"
    }
    fn description(&self) -> &str {
        "Clear the terminal"
    }
    fn execute(&self, _args: &[String], _ctx: &ExecutionContext, _host: &mut dyn CommandHost) -> CommandOutcome {
        CommandOutcome::ok("\u{1b}[2J\u{1b}[H")
    }
}

struct Env;

impl Command for Env {
    fn name(&self) -> &str {
        "env"
    }
    fn description(&self) -> &str {
        "Print or simulate environment variable assignments"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            let vars = host.env().variables();
            let mut keys: Vec<&String> = vars.keys().collect();
            keys.sort();
            let lines: Vec<String> = keys.iter().map(|k| format!("{}={}", k, vars[*k])).collect();
            CommandOutcome::ok(lines.join("\n"))
        } else {
            // `env KEY=VALUE cmd ...` is reserved surface (no nested
            // command execution here); print what would be set.
            let lines: Vec<String> = args.clone();
            CommandOutcome::ok(lines.join("\n"))
        }
    }
}

struct Export;

impl Command for Export {
    fn name(&self) -> &str {
        "export"
    }
    fn description(&self) -> &str {
        "Declare and print exported variables"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            let vars = host.env().variables();
            let mut keys: Vec<&String> = vars.keys().collect();
            keys.sort();
            let lines: Vec<String> = keys
                .iter()
                .map(|k| format!("declare -x {}=\"{}\"", k, vars[*k]))
                .collect();
            return CommandOutcome::ok(lines.join("\n"));
        }
        for arg in args {
            if let Some(eq) = arg.find('=') {
                let (name, value) = (&arg[..eq], &arg[eq + 1..]);
                if !is_valid_var_name(name) {
                    return CommandOutcome::failure(format!("export: not a valid identifier: {}", name), 1);
                }
                host.env_mut().set_environment_variable(name, value).ok();
            } else if !is_valid_var_name(arg) {
                return CommandOutcome::failure(format!("export: not a valid identifier: {}", arg), 1);
            }
        }
        CommandOutcome::ok("")
    }
}

struct Printenv;

impl Command for Printenv {
    fn name(&self) -> &str {
        "printenv"
    }
    fn description(&self) -> &str {
        "Print environment variables"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            let vars = host.env().variables();
            let mut keys: Vec<&String> = vars.keys().collect();
            keys.sort();
            let lines: Vec<String> = keys.iter().map(|k| format!("{}={}", k, vars[*k])).collect();
            return CommandOutcome::ok(lines.join("\n"));
        }
        let mut lines = Vec::new();
        let mut any_found = false;
        for name in args {
            if let Some(value) = host.env().get_variable(name) {
                any_found = true;
                lines.push(value.clone());
            }
        }
        if !any_found {
            return CommandOutcome::failure("", 1);
        }
        CommandOutcome::ok(lines.join("\n"))
    }
}

struct Unset;

impl Command for Unset {
    fn name(&self) -> &str {
        "unset"
    }
    fn description(&self) -> &str {
        "Unset environment variables"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            return CommandOutcome::failure("unset: not enough arguments", 1);
        }
        for name in args {
            if host.env_mut().unset_variable(name).is_err() {
                return CommandOutcome::failure(format!("unset: not a valid identifier: {}", name), 1);
            }
        }
        CommandOutcome::ok("")
    }
}

struct Which;

impl Command for Which {
    fn name(&self) -> &str {
        "which"
    }
    fn description(&self) -> &str {
        "Locate a command via PATH"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        if args.is_empty() {
            return CommandOutcome::failure("which: not enough arguments", 1);
        }
        let path_var = host.env().get_variable("PATH").cloned().unwrap_or_default();
        let cwd = host.env().working_directory().to_string();
        let mut lines = Vec::new();
        let mut any = false;
        for name in args {
            if host.registry().contains(name) {
                lines.push(name.clone());
                any = true;
                continue;
            }
            let vfs = host.vfs();
            if let Some(hit) = super::resolve_path(name, &path_var, |candidate| vfs.exists(&cwd, candidate)) {
                lines.push(hit);
                any = true;
            }
        }
        if !any {
            return CommandOutcome::failure("", 1);
        }
        CommandOutcome::ok(lines.join("\n"))
    }
}

struct Source;

impl Command for Source {
    fn name(&self) -> &str {
        "source"
    }
    fn description(&self) -> &str {
        "Execute a script file in the current environment"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        let Some(path) = args.first() else {
            return CommandOutcome::failure("source: missing file operand", 1);
        };
        match host.run_source(path) {
            Ok((exit_code, stdout, stderr)) => CommandOutcome { stdout, stderr, exit_code },
            Err(message) => CommandOutcome::failure(format!("source: {}", message), 1),
        }
    }
}

struct Help;

const GENERAL_HELP: &str = "moo-dang: a browser-hosted POSIX-like shell\nType `help commands` to list built-in commands, or `help TOPIC` for details.";

fn topics() -> Vec<(&'static str, &'static str)> {
    vec![
        ("pipelines", "Chain commands with |, redirect with <, >, >>, 2>, &>."),
        ("variables", "Reference variables with $NAME or ${NAME}; set with export."),
        ("scripts", "Use `source FILE` to run a sequence of commands from a file."),
    ]
}

fn manpage(registry: &Registry, name: &str) -> Option<String> {
    let description = registry.describe(name)?;
    Some(format!(
        "NAME\n    {}\nUSAGE\n    {} [ARGS...]\nDESCRIPTION\n    {}\nOPTIONS\n    (see DESCRIPTION)\nEXAMPLES\n    {} ...",
        name, name, description, name
    ))
}

impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }
    fn description(&self) -> &str {
        "Show shell help"
    }
    fn execute(&self, args: &[String], _ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome {
        match args.first().map(String::as_str) {
            None => CommandOutcome::ok(GENERAL_HELP),
            Some("topics") => {
                let lines: Vec<String> = topics().iter().map(|(name, _)| name.to_string()).collect();
                CommandOutcome::ok(lines.join("\n"))
            }
            Some("topic") => match args.get(1) {
                Some(name) => match topics().into_iter().find(|(n, _)| n == name) {
                    Some((_, body)) => CommandOutcome::ok(body),
                    None => CommandOutcome::failure(format!("help: unknown topic: {}", name), 1),
                },
                None => CommandOutcome::failure("help: topic requires a name", 1),
            },
            Some("search") => {
                let query = args[1..].join(" ").to_lowercase();
                if query.is_empty() {
                    return CommandOutcome::failure("help: search requires a query", 1);
                }
                let mut hits = Vec::new();
                for name in host.registry().names() {
                    if name.contains(&query) {
                        hits.push(name.to_string());
                    }
                }
                for (topic, body) in topics() {
                    if topic.contains(&query) || body.to_lowercase().contains(&query) {
                        hits.push(topic.to_string());
                    }
                }
                CommandOutcome::ok(hits.join("\n"))
            }
            Some("list") | Some("commands") => {
                CommandOutcome::ok(host.registry().names().join("\n"))
            }
            Some(name) => match manpage(host.registry(), name) {
                Some(text) => CommandOutcome::ok(text),
                None => CommandOutcome::failure(format!("help: no such command: {}", name), 1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, ShellOptions};
    use crate::vfs::Vfs;

    struct TestHost {
        vfs: Vfs,
        env: Environment,
        registry: Registry,
    }

    impl CommandHost for TestHost {
        fn vfs(&self) -> &Vfs {
            &self.vfs
        }
        fn vfs_mut(&mut self) -> &mut Vfs {
            &mut self.vfs
        }
        fn env(&self) -> &Environment {
            &self.env
        }
        fn env_mut(&mut self) -> &mut Environment {
            &mut self.env
        }
        fn now_ms(&self) -> f64 {
            0.0
        }
        fn registry(&self) -> &Registry {
            &self.registry
        }
        fn change_directory(&mut self, path: &str) -> Result<String, String> {
            let vfs = &self.vfs;
            self.env.change_directory(vfs, path).map_err(|e| e.to_string())
        }
        fn run_source(&mut self, _path: &str) -> Result<(i32, String, String), String> {
            Err("not supported in this test harness".to_string())
        }
    }

    fn host() -> TestHost {
        TestHost {
            vfs: Vfs::seeded(0.0),
            env: Environment::new(ShellOptions::main_shell()),
            registry: Registry::with_builtins(),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            pid: 1,
            working_directory: "/home/user".to_string(),
            env: HashMap::new(),
            stdin: String::new(),
            args: Vec::new(),
        }
    }

    #[test]
    fn echo_joins_with_single_spaces() {
        let mut h = host();
        let out = Echo.execute(&["a".to_string(), "b".to_string()], &ctx(), &mut h);
        assert_eq!(out.stdout, "a b");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn cat_missing_file_exits_one() {
        let mut h = host();
        let out = Cat.execute(&["/nope".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("No such file or directory"));
    }

    #[test]
    fn cat_no_args_reports_missing_operand() {
        let mut h = host();
        let out = Cat.execute(&[], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "cat: missing file operand");
    }

    #[test]
    fn cd_to_missing_path_fails_without_moving() {
        let mut h = host();
        let out = Cd.execute(&["/nonexistent".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("cd: no such file or directory: /nonexistent"));
        assert_eq!(h.env().working_directory(), "/home/user");
    }

    #[test]
    fn cd_to_file_reports_not_a_directory() {
        let mut h = host();
        let out = Cd.execute(&["README.md".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("not a directory"));
    }

    #[test]
    fn export_with_no_args_lists_sorted() {
        let mut h = host();
        let out = Export.execute(&[], &ctx(), &mut h);
        assert_eq!(out.exit_code, 0);
        let lines: Vec<&str> = out.stdout.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn export_rejects_invalid_identifier() {
        let mut h = host();
        let out = Export.execute(&["1BAD=x".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
    }

    #[test]
    fn printenv_missing_name_exits_one_when_all_undefined() {
        let mut h = host();
        let out = Printenv.execute(&["NOPE".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
    }

    #[test]
    fn which_finds_builtin_by_name() {
        let mut h = host();
        let out = Which.execute(&["cd".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "cd");
    }

    #[test]
    fn ls_long_format_has_total_header_and_entries() {
        let mut h = host();
        let out = Ls.execute(&["-l".to_string(), "/home/user".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 0);
        let lines: Vec<&str> = out.stdout.lines().collect();
        assert!(lines[0].starts_with("total "));
        assert!(lines.iter().any(|l| l.starts_with('-')));
        assert!(lines.iter().any(|l| l.starts_with('d')));
    }

    #[test]
    fn ls_missing_path_exits_one() {
        let mut h = host();
        let out = Ls.execute(&["/nope".to_string()], &ctx(), &mut h);
        assert_eq!(out.exit_code, 1);
    }

    #[test]
    fn clear_emits_ansi_reset_sequence() {
        let mut h = host();
        let out = Clear.execute(&[], &ctx(), &mut h);
        assert_eq!(out.stdout, "\u{1b}[2J\u{1b}[H");
    }

    #[test]
    fn help_lists_commands() {
        let mut h = host();
        let out = Help.execute(&["list".to_string()], &ctx(), &mut h);
        assert!(out.stdout.contains("echo"));
    }
}
