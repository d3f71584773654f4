//! Annotation paths.
//!
//! A path addresses one node of the plain JSON tree. The root is the empty
//! string and every segment is introduced by `.`; `\` and `.` inside a
//! segment are escaped with `\`. Array positions are written as decimal
//! indices, so `.tags.0` is the first element of the `tags` field.

use super::CodecError;

/// Append one segment to an encoded path.
pub(crate) fn push_segment(path: &str, segment: &str) -> String {
    let mut out = String::with_capacity(path.len() + segment.len() + 1);
    out.push_str(path);
    out.push('.');
    for ch in segment.chars() {
        if ch == '.' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Append an array position to an encoded path.
pub(crate) fn push_index(path: &str, index: usize) -> String {
    format!("{}.{}", path, index)
}

/// Split an encoded path into its unescaped segments.
pub(crate) fn parse(path: &str) -> Result<Vec<String>, CodecError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let mut chars = path.chars();
    if chars.next() != Some('.') {
        return Err(CodecError::InvalidPath(path.to_string()));
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped @ ('.' | '\\')) => current.push(escaped),
                _ => return Err(CodecError::InvalidPath(path.to_string())),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    Ok(segments)
}
