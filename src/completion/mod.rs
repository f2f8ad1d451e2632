//! Completion Engine: a `Vec<Box<dyn CompletionProvider>>`, the same
//! "model dynamic dispatch collections as interface-with-methods" shape
//! the command registry uses, applied to tab-completion.

pub mod providers;

use std::collections::{HashMap, HashSet};

/// Where in the input the cursor sits, and the pieces derived from that:
/// the split tokens, which one the cursor is in, and whether that token
/// is the first (a command name, not an argument).
#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub input: String,
    pub cursor: usize,
    pub parts: Vec<String>,
    pub part_index: usize,
    pub current_part: String,
    pub working_directory: String,
    pub env_snapshot: HashMap<String, String>,
    pub is_new_command: bool,
    /// Directory entries for whatever directory the current part implies,
    /// fetched by the caller (which owns the VFS) before completion runs,
    /// so providers stay free of VFS access. `(name, is_directory)`.
    pub directory_entries: Vec<(String, bool)>,
}

impl CompletionContext {
    /// Splits `input` on whitespace (preserving empty trailing parts so a
    /// trailing space starts a fresh, empty part) and locates which part
    /// the cursor falls in.
    pub fn derive(
        input: &str,
        cursor: usize,
        working_directory: String,
        env_snapshot: HashMap<String, String>,
        directory_entries: Vec<(String, bool)>,
    ) -> Self {
        let prefix = &input[..cursor.min(input.len())];
        let parts: Vec<String> = split_parts(input);
        let part_index = prefix.split_whitespace().count().saturating_sub(1).max(0);
        let in_trailing_space = prefix.ends_with(' ') || prefix.is_empty();
        let (part_index, current_part) = if in_trailing_space {
            (parts.len(), String::new())
        } else {
            (part_index, parts.get(part_index).cloned().unwrap_or_default())
        };
        let is_new_command = part_index == 0;
        Self {
            input: input.to_string(),
            cursor,
            parts,
            part_index,
            current_part,
            working_directory,
            env_snapshot,
            is_new_command,
            directory_entries,
        }
    }
}

fn split_parts(input: &str) -> Vec<String> {
    input.split_whitespace().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    Command,
    File,
    Directory,
    Variable,
    Option,
}

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub requires_space: bool,
    /// Explicit replacement range, when a provider knows better than the
    /// token boundary around the cursor (e.g. `$` prefix completions).
    pub range: Option<(usize, usize)>,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, kind: SuggestionKind, priority: Priority) -> Self {
        Self {
            text: text.into(),
            kind,
            priority,
            requires_space: false,
            range: None,
        }
    }

    pub fn requiring_space(mut self) -> Self {
        self.requires_space = true;
        self
    }

    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        self.range = Some((start, end));
        self
    }
}

pub trait CompletionProvider {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn can_complete(&self, ctx: &CompletionContext) -> bool;
    fn get_completions(&self, ctx: &CompletionContext, options: &CompletionOptions) -> Vec<Suggestion>;
}

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub min_input_length: usize,
    pub max_suggestions: usize,
    pub case_sensitive: bool,
    pub auto_complete_prefix: bool,
    pub include_hidden_files: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            min_input_length: 0,
            max_suggestions: 20,
            case_sensitive: false,
            auto_complete_prefix: true,
            include_hidden_files: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub suggestions: Vec<Suggestion>,
    pub has_more: bool,
    pub common_prefix: Option<String>,
}

pub struct CompletionEngine {
    providers: Vec<Box<dyn CompletionProvider>>,
    ids: HashSet<String>,
}

impl CompletionEngine {
    pub fn new() -> Self {
        Self { providers: Vec::new(), ids: HashSet::new() }
    }

    /// Registers a provider. A duplicate id is silently dropped rather
    /// than treated as an error.
    pub fn register(&mut self, provider: Box<dyn CompletionProvider>) {
        if self.ids.insert(provider.id().to_string()) {
            self.providers.push(provider);
        }
    }

    pub fn complete(&self, ctx: &CompletionContext, options: &CompletionOptions) -> CompletionResult {
        if ctx.input.len() < options.min_input_length {
            return CompletionResult::default();
        }

        let mut suggestions: Vec<Suggestion> = Vec::new();
        for provider in &self.providers {
            if provider.can_complete(ctx) {
                suggestions.extend(provider.get_completions(ctx, options));
            }
        }

        let current = if options.case_sensitive {
            ctx.current_part.clone()
        } else {
            ctx.current_part.to_lowercase()
        };

        suggestions.sort_by(|a, b| {
            let a_text = if options.case_sensitive { a.text.clone() } else { a.text.to_lowercase() };
            let b_text = if options.case_sensitive { b.text.clone() } else { b.text.to_lowercase() };
            let a_exact = a_text == current;
            let b_exact = b_text == current;
            b_exact
                .cmp(&a_exact)
                .then(b.priority.cmp(&a.priority))
                .then(b_text.starts_with(&current).cmp(&a_text.starts_with(&current)))
                .then(a_text.cmp(&b_text))
        });

        let has_more = suggestions.len() > options.max_suggestions;
        suggestions.truncate(options.max_suggestions);

        let common_prefix = if options.auto_complete_prefix {
            longest_common_prefix(&suggestions)
        } else {
            None
        };

        CompletionResult { suggestions, has_more, common_prefix }
    }
}

impl Default for CompletionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn longest_common_prefix(suggestions: &[Suggestion]) -> Option<String> {
    let mut iter = suggestions.iter();
    let first = iter.next()?.text.clone();
    let mut prefix = first;
    for s in iter {
        let mut common_len = 0;
        for (a, b) in prefix.chars().zip(s.text.chars()) {
            if a == b {
                common_len += a.len_utf8();
            } else {
                break;
            }
        }
        prefix.truncate(common_len);
        if prefix.is_empty() {
            return None;
        }
    }
    Some(prefix)
}

/// Replaces `[word_start, word_end)` in `input` with `suggestion.text`,
/// appending a trailing space if the suggestion requires one. Returns the
/// new input and the cursor position (end of the inserted text).
pub fn apply_suggestion(input: &str, suggestion: &Suggestion, cursor: usize) -> (String, usize) {
    let (start, end) = suggestion.range.unwrap_or_else(|| token_bounds(input, cursor));
    let start = start.min(input.len());
    let end = end.min(input.len()).max(start);
    let mut replacement = suggestion.text.clone();
    if suggestion.requires_space {
        replacement.push(' ');
    }
    let mut new_input = String::with_capacity(input.len() - (end - start) + replacement.len());
    new_input.push_str(&input[..start]);
    new_input.push_str(&replacement);
    new_input.push_str(&input[end..]);
    let new_cursor = start + replacement.len();
    (new_input, new_cursor)
}

fn token_bounds(input: &str, cursor: usize) -> (usize, usize) {
    let cursor = cursor.min(input.len());
    let start = input[..cursor]
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = input[cursor..]
        .find(char::is_whitespace)
        .map(|i| cursor + i)
        .unwrap_or(input.len());
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(input: &str, cursor: usize) -> CompletionContext {
        CompletionContext::derive(input, cursor, "/home/user".to_string(), HashMap::new(), Vec::new())
    }

    #[test]
    fn derive_finds_current_part() {
        let c = ctx("ls doc", 6);
        assert_eq!(c.current_part, "doc");
        assert!(!c.is_new_command);
    }

    #[test]
    fn derive_detects_new_command() {
        let c = ctx("", 0);
        assert!(c.is_new_command);
    }

    #[test]
    fn min_input_length_yields_empty_result() {
        let engine = CompletionEngine::new();
        let options = CompletionOptions { min_input_length: 5, ..Default::default() };
        let result = engine.complete(&ctx("ls", 2), &options);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        struct Dummy(&'static str);
        impl CompletionProvider for Dummy {
            fn id(&self) -> &str {
                self.0
            }
            fn name(&self) -> &str {
                self.0
            }
            fn can_complete(&self, _ctx: &CompletionContext) -> bool {
                false
            }
            fn get_completions(&self, _ctx: &CompletionContext, _options: &CompletionOptions) -> Vec<Suggestion> {
                Vec::new()
            }
        }
        let mut engine = CompletionEngine::new();
        engine.register(Box::new(Dummy("dup")));
        engine.register(Box::new(Dummy("dup")));
        assert_eq!(engine.providers.len(), 1);
    }

    #[test]
    fn exact_match_sorts_before_prefix_match() {
        struct Both;
        impl CompletionProvider for Both {
            fn id(&self) -> &str {
                "both"
            }
            fn name(&self) -> &str {
                "both"
            }
            fn can_complete(&self, _ctx: &CompletionContext) -> bool {
                true
            }
            fn get_completions(&self, _ctx: &CompletionContext, _options: &CompletionOptions) -> Vec<Suggestion> {
                vec![
                    Suggestion::new("lsof", SuggestionKind::Command, Priority::Medium),
                    Suggestion::new("ls", SuggestionKind::Command, Priority::Medium),
                ]
            }
        }
        let mut engine = CompletionEngine::new();
        engine.register(Box::new(Both));
        let result = engine.complete(&ctx("ls", 2), &CompletionOptions::default());
        assert_eq!(result.suggestions[0].text, "ls");
    }

    #[test]
    fn apply_suggestion_replaces_current_token() {
        let s = Suggestion::new("ls", SuggestionKind::Command, Priority::High).requiring_space();
        let (new_input, cursor) = apply_suggestion("l", &s, 1);
        assert_eq!(new_input, "ls ");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn common_prefix_computed_across_suggestions() {
        let suggestions = vec![
            Suggestion::new("documents", SuggestionKind::Directory, Priority::Medium),
            Suggestion::new("download", SuggestionKind::Directory, Priority::Medium),
        ];
        assert_eq!(longest_common_prefix(&suggestions), Some("do".to_string()));
    }
}
