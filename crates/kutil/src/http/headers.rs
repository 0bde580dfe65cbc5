// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Case-insensitive, order-preserving header map.

use super::HttpError;

/// Internal marker: a writer that finds it skips Content-Length and drops
/// the marker instead of emitting it.
pub const OMIT_CONTENT_LENGTH: &str = "X-Omit-Content-Length";

/// Header fields in insertion order.
///
/// Lookups compare names ASCII case-insensitively; the casing given on
/// insert is what goes on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` to `value`. An existing field keeps its position (and
    /// casing); duplicates of it are removed.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(pos) => {
                self.entries[pos].1 = value;
                let mut i = pos + 1;
                while i < self.entries.len() {
                    if self.entries[i].0.eq_ignore_ascii_case(&name) {
                        self.entries.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Add a field without touching existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every field named `name`; returns the first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut first = None;
        self.entries.retain(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                if first.is_none() {
                    first = Some(v.clone());
                }
                false
            } else {
                true
            }
        });
        first
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// True when a comma-separated field lists `token` (case-insensitive),
    /// e.g. `has_token("Connection", "upgrade")` for `keep-alive, Upgrade`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Declared Content-Length, if any.
    pub fn content_length(&self) -> Result<Option<usize>, HttpError> {
        let mut values = self.get_all("Content-Length");
        let Some(first) = values.next() else {
            return Ok(None);
        };
        let len = first
            .trim()
            .parse::<usize>()
            .map_err(|_| HttpError::InvalidLength(first.to_string()))?;
        if values.any(|v| v.trim() != first.trim()) {
            return Err(HttpError::InvalidLength("conflicting Content-Length".into()));
        }
        Ok(Some(len))
    }

    /// Parse one `Name: Value` line (without CRLF).
    pub fn parse_line(line: &str) -> Result<(String, String), HttpError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::MalformedHeader(line.to_string()))?;
        if name.is_empty() || name.bytes().any(|b| b <= b' ' || b == 0x7f) {
            return Err(HttpError::MalformedHeader(line.to_string()));
        }
        Ok((name.to_string(), value.trim().to_string()))
    }

    /// `Name: Value\r\n` for every field. CR and LF inside names or values
    /// are dropped so a field can never start a new line.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            push_field(out, name);
            out.extend_from_slice(b": ");
            push_field(out, value);
            out.extend_from_slice(b"\r\n");
        }
    }
}

/// Append `text` without its line breaks.
pub(crate) fn push_field(out: &mut Vec<u8>, text: &str) {
    out.extend(text.bytes().filter(|b| !matches!(b, b'\r' | b'\n')));
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (n, v) in iter {
            map.append(n, v);
        }
        map
    }
}
