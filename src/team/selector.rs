use crate::messages::TextMessage;

pub const DEFAULT_SELECTOR_PROMPT: &str = "You are in a role play game. The following roles are available:
{roles}.
Read the following conversation. Then select the next role from {participants} to play. Only return the role.

{history}

Read the above conversation. Then select the next role from {participants} to play. Only return the role.";

/// Fills `{roles}`, `{participants}` and `{history}` in one pass, so braces
/// inside the substituted text are left alone. Unknown placeholders stay as-is.
pub fn render_selector_prompt(template: &str, roles: &str, participants: &str, history: &str) -> String {
    let mut out = String::with_capacity(template.len() + roles.len() + history.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let replacement = [
            ("{roles}", roles),
            ("{participants}", participants),
            ("{history}", history),
        ]
        .into_iter()
        .find(|(key, _)| after.starts_with(key));
        match replacement {
            Some((key, value)) => {
                out.push_str(value);
                rest = &after[key.len()..];
            }
            None => {
                out.push('{');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `name: description` per line, with runs of whitespace collapsed.
pub fn format_roles<'a>(roles: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    roles
        .into_iter()
        .map(|(name, description)| {
            format!("{name}: {description}")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history(thread: &[TextMessage]) -> String {
    thread
        .iter()
        .map(|m| format!("{}: {}", m.source, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn count_bounded(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(idx, _)| {
            let before = haystack[..*idx].chars().next_back();
            let after = haystack[idx + needle.len()..].chars().next();
            before.is_some_and(|c| !is_word_char(c)) && after.is_some_and(|c| !is_word_char(c))
        })
        .count()
}

/// Counts whole-word mentions of `name` in `text`. `git_assistant` also
/// matches `git assistant` and the markdown-escaped `git\_assistant`.
pub fn count_mentions(text: &str, name: &str) -> usize {
    let padded = format!(" {text} ");
    let mut variants = vec![
        name.to_string(),
        name.replace('_', " "),
        name.replace('_', "\\_"),
    ];
    variants.sort();
    variants.dedup();
    variants
        .iter()
        .map(|variant| count_bounded(&padded, variant))
        .sum()
}

/// Candidates mentioned in `text`, with their mention counts.
pub fn mentioned_agents<'a>(text: &str, candidates: &[&'a str]) -> Vec<(&'a str, usize)> {
    candidates
        .iter()
        .map(|name| (*name, count_mentions(text, name)))
        .filter(|(_, count)| *count > 0)
        .collect()
}
