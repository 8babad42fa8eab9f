//! Scalar lookup in parsed resource content and in the resource's source text.
//!
//! Content paths are lists of mapping keys; a `*` segment fans out over every
//! item of a sequence (`spec.containers.*.image`).

use kubelink_core::RefPosition;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A scalar read from a content path.
#[derive(Debug, Clone)]
pub struct ScalarHit<'a> {
    /// The scalar rendered as a string.
    pub value: String,
    /// The mapping the scalar was read from, for sibling lookups.
    pub parent: Option<&'a Map<String, Value>>,
}

/// All scalars at `path`, in document order.
pub fn scalars_at<'a, S: AsRef<str>>(content: &'a Value, path: &[S]) -> Vec<ScalarHit<'a>> {
    let mut hits = Vec::new();
    walk(content, path, None, &mut hits);
    hits
}

fn walk<'a, S: AsRef<str>>(
    value: &'a Value,
    path: &[S],
    parent: Option<&'a Map<String, Value>>,
    hits: &mut Vec<ScalarHit<'a>>,
) {
    let Some((segment, rest)) = path.split_first() else {
        if let Some(scalar) = scalar_string(value) {
            hits.push(ScalarHit {
                value: scalar,
                parent,
            });
        }
        return;
    };

    match (segment.as_ref(), value) {
        ("*", Value::Array(items)) => {
            for item in items {
                walk(item, rest, parent, hits);
            }
        }
        (key, Value::Object(map)) => {
            if let Some(child) = map.get(key) {
                walk(child, rest, Some(map), hits);
            }
        }
        _ => {}
    }
}

/// The first string scalar at a path of plain keys.
pub fn string_at<'a>(content: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(content, |value, key| value.get(*key))
        .and_then(Value::as_str)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Finds the line/column of referenced scalars in a resource's text.
///
/// Each returned position is handed out once, so repeated values (two
/// containers using the same ConfigMap) map to successive occurrences.
pub struct ScalarLocator<'a> {
    lines: Vec<&'a str>,
    used: HashSet<(usize, usize)>,
}

impl<'a> ScalarLocator<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            used: HashSet::new(),
        }
    }

    /// Position of `value` as it appears under `path`, if it can be found.
    pub fn locate<S: AsRef<str>>(&mut self, path: &[S], value: &str) -> Option<RefPosition> {
        let keys: Vec<&str> = path
            .iter()
            .map(AsRef::as_ref)
            .filter(|segment| *segment != "*")
            .collect();
        let is_item = path.last().is_some_and(|s| s.as_ref() == "*");
        let (anchors, last_key) = if is_item {
            (&keys[..], None)
        } else {
            match keys.split_last() {
                Some((last, anchors)) => (anchors, Some(*last)),
                None => (&keys[..], None),
            }
        };

        let mut start = 0;
        for key in anchors {
            if let Some(idx) = self.find_key_line(start, key) {
                start = idx;
            }
        }

        let order = (start..self.lines.len()).chain(0..start);
        for idx in order {
            if let Some(col) = match_value(self.lines[idx], last_key, value) {
                if self.used.insert((idx, col)) {
                    return Some(RefPosition {
                        line: idx + 1,
                        column: col + 1,
                        length: value.len(),
                    });
                }
            }
        }
        None
    }

    fn find_key_line(&self, start: usize, key: &str) -> Option<usize> {
        (start..self.lines.len()).find(|&idx| {
            let (rest, _) = strip_markers(self.lines[idx]);
            rest.strip_prefix(key).is_some_and(|r| r.starts_with(':'))
        })
    }
}

/// Strip indentation and sequence markers, returning the rest and its byte offset.
fn strip_markers(line: &str) -> (&str, usize) {
    let mut offset = line.len() - line.trim_start().len();
    let mut rest = &line[offset..];
    while let Some(after) = rest.strip_prefix('-') {
        if !(after.is_empty() || after.starts_with(' ')) {
            break;
        }
        let trimmed = after.trim_start();
        offset += rest.len() - trimmed.len();
        rest = trimmed;
    }
    (rest, offset)
}

fn match_value(line: &str, key: Option<&str>, value: &str) -> Option<usize> {
    let (rest, offset) = strip_markers(line);
    let (candidate, offset) = match key {
        Some(key) => {
            let after = rest.strip_prefix(key)?.strip_prefix(':')?;
            let trimmed = after.trim_start();
            (trimmed, offset + key.len() + 1 + (after.len() - trimmed.len()))
        }
        None => (rest, offset),
    };

    let candidate = strip_comment(candidate).trim_end();
    let (inner, quote) = unquote(candidate);
    (inner == value).then_some(offset + quote)
}

fn strip_comment(s: &str) -> &str {
    match s.find(" #") {
        Some(idx) => &s[..idx],
        None if s.starts_with('#') => "",
        None => s,
    }
}

fn unquote(s: &str) -> (&str, usize) {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return (&s[1..s.len() - 1], 1);
        }
    }
    (s, 0)
}
