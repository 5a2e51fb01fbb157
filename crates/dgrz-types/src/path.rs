//! Workspace-relative paths (`a/b/c`).
//!
//! Rules for each element:
//! - First character is ASCII alphanumeric
//! - Remaining characters are ASCII alphanumeric or one of `.`, `_`, `-`
//!
//! Empty elements (`a//b`) are collapsed. A trailing separator is remembered
//! (directory intent) but does not take part in equality.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{DgrzError, DgrzResult, ErrorKind};

/// The path separator.
pub const SEPARATOR: char = '/';

/// A validated, non-empty sequence of path elements.
#[derive(Clone, Debug)]
pub struct WorkspacePath {
    elements: Vec<String>,
    trailing_separator: bool,
}

impl WorkspacePath {
    /// Parse and validate a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use dgrz_types::WorkspacePath;
    ///
    /// let p = WorkspacePath::parse("people/staff/").unwrap();
    /// assert_eq!(p.element_count(), 2);
    /// assert!(p.ends_with_separator());
    /// assert!(WorkspacePath::parse("").is_err());
    /// assert!(WorkspacePath::parse("a/$b").is_err());
    /// ```
    pub fn parse(input: &str) -> DgrzResult<Self> {
        let mut elements = Vec::new();
        let mut offset = 0usize;

        for raw in input.split(SEPARATOR) {
            if !raw.is_empty() {
                validate_element(raw, offset)?;
                elements.push(raw.to_string());
            }
            offset += raw.len() + SEPARATOR.len_utf8();
        }

        if elements.is_empty() {
            return Err(DgrzError::invalid_value("path has no elements")
                .with_context("path", input));
        }

        Ok(Self {
            elements,
            trailing_separator: input.ends_with(SEPARATOR),
        })
    }

    /// Build a path from already-split elements.
    pub fn from_elements<I, S>(elements: I) -> DgrzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = elements
            .into_iter()
            .map(|e| e.as_ref().to_string())
            .collect();
        Self::parse(&joined.join("/"))
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn ends_with_separator(&self) -> bool {
        self.trailing_separator
    }

    /// The last element.
    pub fn file_name(&self) -> &str {
        // Never empty: parse rejects zero elements.
        self.elements.last().map(String::as_str).unwrap_or_default()
    }

    /// Join with another path, dropping this path's trailing separator.
    pub fn join(&self, other: &WorkspacePath) -> WorkspacePath {
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().cloned());
        WorkspacePath {
            elements,
            trailing_separator: other.trailing_separator,
        }
    }

    /// Relative filesystem path for this workspace path.
    pub fn to_path_buf(&self) -> std::path::PathBuf {
        self.elements.iter().collect()
    }
}

fn validate_element(element: &str, offset: usize) -> DgrzResult<()> {
    let invalid = |reason: &str| {
        DgrzError::new(ErrorKind::InvalidPathElement, format!("invalid path element: {reason}"))
            .with_context("element", element)
            .with_context("offset", offset)
    };

    let mut chars = element.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return Err(invalid("must start with an alphanumeric character")),
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
            return Err(invalid(&format!("forbidden character {c:?}")));
        }
    }
    Ok(())
}

impl fmt::Display for WorkspacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.elements.join("/"))?;
        if self.trailing_separator {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl FromStr for WorkspacePath {
    type Err = DgrzError;

    fn from_str(s: &str) -> DgrzResult<Self> {
        Self::parse(s)
    }
}

impl PartialEq for WorkspacePath {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Eq for WorkspacePath {}

impl Hash for WorkspacePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.elements.hash(state);
    }
}

impl PartialOrd for WorkspacePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkspacePath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.elements.cmp(&other.elements)
    }
}
