pub mod ai_usage_log;
pub mod note;
pub mod notification;
pub mod priority;
pub mod project;
pub mod project_member;
pub mod role;
pub mod task;
pub mod todo;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

/// `%term%` for a LIKE clause with `\` as the escape character.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
