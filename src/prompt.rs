//! Completion prompt normalization.
//!
//! WCA's prompt preprocessor is sensitive to two things the IDE plugins
//! routinely send: multi-task comment prompts that embed `- name:` preambles
//! (which read as YAML task headers, not task descriptions), and trailing
//! `:` or whitespace runs that signal YAML block continuation. Both are
//! normalized away before the prompt goes on the wire.
//!
//! All functions here are pure, and [`normalize_prompt`] is idempotent.

/// A multi-task prompt starts, after leading whitespace, with `#` and
/// enumerates task descriptions separated by `&`.
pub fn is_multi_task_prompt(prompt: &str) -> bool {
    prompt.trim_start().starts_with('#')
}

/// Number of `&`-separated tasks in a multi-task prompt, 1 otherwise.
///
/// Drives the per-request timeout multiplier: a prompt asking for five
/// tasks is allowed five times the single-task budget.
pub fn task_count(prompt: &str) -> usize {
    if is_multi_task_prompt(prompt) {
        prompt.split('&').count()
    } else {
        1
    }
}

/// Normalize a completion prompt for transmission.
///
/// 1. In a multi-task prompt, strip `- name:` preambles from each task
///    description.
/// 2. Unify the prompt's trailing whitespace/punctuation to exactly one
///    newline, dropping trailing `:` runs.
pub fn normalize_prompt(prompt: &str) -> String {
    let stripped = if is_multi_task_prompt(prompt) && prompt.contains("- name:") {
        strip_task_preambles(prompt)
    } else {
        prompt.to_string()
    };

    let trimmed = stripped.trim_end_matches(|c: char| c.is_whitespace() || c == ':');
    format!("{}\n", trimmed)
}

/// Remove leading `- name:` fragments from each `&`-separated task
/// description, keeping the `#` marker and the `&` separators intact.
fn strip_task_preambles(prompt: &str) -> String {
    prompt
        .split('&')
        .map(strip_segment_preamble)
        .collect::<Vec<_>>()
        .join("&")
}

fn strip_segment_preamble(segment: &str) -> String {
    let mut rest = segment.trim_start();
    let mut prefix = String::new();

    // The first segment carries the '#' comment marker.
    if let Some(after_hash) = rest.strip_prefix('#') {
        prefix.push('#');
        rest = after_hash.trim_start();
    }

    let mut stripped = false;
    while let Some(description) = rest.strip_prefix("- name:") {
        rest = description.trim_start();
        stripped = true;
    }

    if stripped {
        format!("{} {}", prefix, rest)
    } else {
        segment.to_string()
    }
}
