//! Built-in completion providers: commands, files, environment variables,
//! and the fixed vocabulary of flag-style options.

use super::{CompletionContext, CompletionOptions, CompletionProvider, Priority, Suggestion, SuggestionKind};

/// Completes command names in the first token of a new command. Holds a
/// static snapshot of registry names taken at construction time — builtins
/// never change after startup, so this never goes stale.
pub struct CommandsProvider {
    names: Vec<String>,
}

impl CommandsProvider {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl CompletionProvider for CommandsProvider {
    fn id(&self) -> &str {
        "commands"
    }

    fn name(&self) -> &str {
        "Commands"
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        ctx.is_new_command
    }

    fn get_completions(&self, ctx: &CompletionContext, _options: &CompletionOptions) -> Vec<Suggestion> {
        let prefix = ctx.current_part.to_lowercase();
        self.names
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .map(|name| Suggestion::new(name.clone(), SuggestionKind::Command, Priority::High).requiring_space())
            .collect()
    }
}

/// Completes file and directory names against the pre-fetched
/// `directory_entries` on the context (the caller, which owns the VFS,
/// fills this in before invoking the engine).
pub struct FilesProvider;

impl CompletionProvider for FilesProvider {
    fn id(&self) -> &str {
        "files"
    }

    fn name(&self) -> &str {
        "Files"
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        !ctx.is_new_command
    }

    fn get_completions(&self, ctx: &CompletionContext, options: &CompletionOptions) -> Vec<Suggestion> {
        let prefix = ctx.current_part.to_lowercase();
        ctx.directory_entries
            .iter()
            .filter(|(name, _)| options.include_hidden_files || !name.starts_with('.'))
            .filter(|(name, _)| name.to_lowercase().starts_with(&prefix))
            .map(|(name, is_dir)| {
                if *is_dir {
                    Suggestion::new(name.clone(), SuggestionKind::Directory, Priority::Medium)
                } else {
                    Suggestion::new(name.clone(), SuggestionKind::File, Priority::Medium).requiring_space()
                }
            })
            .collect()
    }
}

/// Completes `$NAME` references using the context's environment snapshot.
pub struct EnvironmentVariablesProvider;

impl CompletionProvider for EnvironmentVariablesProvider {
    fn id(&self) -> &str {
        "env-vars"
    }

    fn name(&self) -> &str {
        "Environment variables"
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        ctx.current_part.starts_with('$')
    }

    fn get_completions(&self, ctx: &CompletionContext, _options: &CompletionOptions) -> Vec<Suggestion> {
        let needle = ctx.current_part.trim_start_matches('$').to_lowercase();
        let mut names: Vec<&String> = ctx.env_snapshot.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter(|name| name.to_lowercase().starts_with(&needle))
            .map(|name| Suggestion::new(format!("${}", name), SuggestionKind::Variable, Priority::Medium))
            .collect()
    }
}

/// Completes flag-style options for commands that accept a fixed set.
pub struct OptionsProvider;

const KNOWN_OPTIONS: &[(&str, &[&str])] = &[("ls", &["-l", "-a"]), ("help", &["topics", "search", "list", "commands"])];

impl CompletionProvider for OptionsProvider {
    fn id(&self) -> &str {
        "options"
    }

    fn name(&self) -> &str {
        "Options"
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        !ctx.is_new_command && ctx.parts.first().map(|c| KNOWN_OPTIONS.iter().any(|(name, _)| name == c)).unwrap_or(false)
    }

    fn get_completions(&self, ctx: &CompletionContext, _options: &CompletionOptions) -> Vec<Suggestion> {
        let Some(command) = ctx.parts.first() else { return Vec::new() };
        let Some((_, opts)) = KNOWN_OPTIONS.iter().find(|(name, _)| name == command) else { return Vec::new() };
        let prefix = ctx.current_part.to_lowercase();
        opts.iter()
            .filter(|opt| opt.to_lowercase().starts_with(&prefix))
            .map(|opt| Suggestion::new(opt.to_string(), SuggestionKind::Option, Priority::Low).requiring_space())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx(input: &str, cursor: usize, entries: Vec<(String, bool)>, env: HashMap<String, String>) -> CompletionContext {
        CompletionContext::derive(input, cursor, "/home/user".to_string(), env, entries)
    }

    #[test]
    fn commands_provider_filters_by_prefix() {
        let provider = CommandsProvider::new(vec!["cat".to_string(), "cd".to_string(), "echo".to_string()]);
        let c = ctx("c", 1, Vec::new(), HashMap::new());
        let options = CompletionOptions::default();
        let suggestions = provider.get_completions(&c, &options);
        let texts: Vec<&str> = suggestions.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["cat", "cd"]);
    }

    #[test]
    fn files_provider_skips_hidden_by_default() {
        let entries = vec![("doc.txt".to_string(), false), (".secret".to_string(), false)];
        let c = ctx("cat ", 4, entries, HashMap::new());
        let provider = FilesProvider;
        let options = CompletionOptions::default();
        let suggestions = provider.get_completions(&c, &options);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "doc.txt");
    }

    #[test]
    fn env_provider_matches_dollar_prefix() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/user".to_string());
        env.insert("USER".to_string(), "user".to_string());
        let c = ctx("echo $HO", 8, Vec::new(), env);
        let provider = EnvironmentVariablesProvider;
        let options = CompletionOptions::default();
        let suggestions = provider.get_completions(&c, &options);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "$HOME");
    }

    #[test]
    fn options_provider_only_fires_for_known_commands() {
        let c = ctx("ls -", 4, Vec::new(), HashMap::new());
        let provider = OptionsProvider;
        assert!(provider.can_complete(&c));
        let other = ctx("cat -", 5, Vec::new(), HashMap::new());
        assert!(!provider.can_complete(&other));
    }
}
