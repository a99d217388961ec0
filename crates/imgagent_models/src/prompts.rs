//! Prompts sent to the chat model.

pub(crate) const ROLE_SYSTEM_PROMPT: &str = "You are a literary analyst. Read the novel text and \
list every named character. For each character give: name, gender, character (a one-sentence \
personality summary), appearance (a concrete physical description usable as an illustration \
prompt). Output ONLY valid JSON of the form \
{\"roles\": [{\"name\": \"\", \"gender\": \"\", \"character\": \"\", \"appearance\": \"\"}]}.";

pub(crate) const SCENE_SYSTEM_PROMPT: &str = "You are a storyboard writer. Split the chapter into \
its scenes in reading order. Each scene is a self-contained visual moment: describe setting, \
characters present and action in a few sentences suitable both as an illustration prompt and as \
narration. Output ONLY valid JSON of the form {\"scenes\": [{\"content\": \"\"}]}.";

/// Upper bound on characters of document text sent for role extraction.
pub(crate) const MAX_ROLE_INPUT_CHARS: usize = 60_000;

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
