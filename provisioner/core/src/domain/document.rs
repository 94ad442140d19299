// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Configuration Document Model
//!
//! A [`Document`] keeps the exact bytes of a configuration file as an ordered
//! list of lines (terminators included), and exposes a typed [`Section`] view
//! built by the kind-specific parsers in [`crate::domain::topology`] and
//! [`crate::domain::routing`].
//!
//! Insertion is anchor-based: a [`TenantBlock`] is spliced in immediately
//! before the first line matching an [`Anchor`]. Every byte outside the splice
//! point is preserved. [`verify_insertion`] then re-parses both versions and
//! checks that the only structural change is the new tenant node.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::provisioning::ProvisionError;
use crate::domain::{routing, topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Topology,
    Routing,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology => f.write_str("topology"),
            Self::Routing => f.write_str("routing"),
        }
    }
}

/// Insertion reference point.
#[derive(Debug, Clone)]
pub enum Anchor {
    /// First line matching the pattern (terminator stripped before matching).
    Line(Regex),
    /// Last line consisting solely of `}` once comments are stripped.
    FinalClosingDelimiter,
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(pattern) => write!(f, "/{}/", pattern.as_str()),
            Self::FinalClosingDelimiter => f.write_str("final closing '}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// Lines before the first structured entry.
    Preamble,
    /// Free text between structured entries.
    Text,
    /// A run of comment lines.
    Comment,
    /// A service entry under the topology's `services:` key.
    Service { name: String },
    /// A top-level topology key after `services:` (`volumes:`, `networks:` ...).
    TopLevel { key: String },
    /// A routing `server { ... }` block.
    Server { listen: Vec<u16>, root: Option<String> },
    /// The routing document's final closing delimiter and anything after it.
    Closing,
}

/// A contiguous run of lines with a structural meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    /// Index of the first line of the section.
    pub start: usize,
    pub text: String,
}

impl Section {
    pub(crate) fn new(kind: SectionKind, start: usize) -> Self {
        Self {
            kind,
            start,
            text: String::new(),
        }
    }

    /// Whether this section is a tenant-bearing node (service or server block).
    pub fn is_entry(&self) -> bool {
        matches!(
            self.kind,
            SectionKind::Service { .. } | SectionKind::Server { .. }
        )
    }
}

/// Rendered lines for one tenant, ready to splice into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantBlock {
    lines: Vec<String>,
}

impl TenantBlock {
    /// Indent every non-empty line of `rendered` and terminate each line
    /// with `line_ending`.
    pub fn from_rendered(rendered: &str, indent: &str, line_ending: &str) -> Self {
        let lines = rendered
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    line_ending.to_string()
                } else {
                    format!("{indent}{line}{line_ending}")
                }
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: PathBuf,
    kind: DocumentKind,
    lines: Vec<String>,
}

impl Document {
    pub fn parse(path: impl Into<PathBuf>, kind: DocumentKind, text: &str) -> Self {
        Self {
            path: path.into(),
            kind,
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The document's bytes, exactly as read plus any insertions.
    pub fn render(&self) -> String {
        self.lines.concat()
    }

    /// `\r\n` if the document already uses it, `\n` otherwise.
    pub fn line_ending(&self) -> &'static str {
        if self.lines.iter().any(|line| line.ends_with("\r\n")) {
            "\r\n"
        } else {
            "\n"
        }
    }

    pub fn sections(&self) -> Vec<Section> {
        match self.kind {
            DocumentKind::Topology => topology::sections(&self.lines),
            DocumentKind::Routing => routing::sections(&self.lines),
        }
    }

    /// Indentation used by the document's existing tenant entries.
    pub fn entry_indent(&self) -> String {
        match self.kind {
            DocumentKind::Topology => topology::service_indent(&self.lines),
            DocumentKind::Routing => routing::server_indent(&self.lines),
        }
    }

    /// Line index of the anchor, if present.
    pub fn find_anchor(&self, anchor: &Anchor) -> Option<usize> {
        match anchor {
            Anchor::Line(pattern) => self
                .lines
                .iter()
                .position(|line| pattern.is_match(strip_terminator(line))),
            Anchor::FinalClosingDelimiter => self
                .lines
                .iter()
                .rposition(|line| routing::strip_comment(line).trim() == "}"),
        }
    }

    /// Splice `block` in immediately before the anchor line.
    ///
    /// Returns the line index the block starts at. Fails with
    /// `AnchorNotFound` without touching the document when the anchor is
    /// absent.
    pub fn insert_before_anchor(
        &mut self,
        anchor: &Anchor,
        block: &TenantBlock,
    ) -> Result<usize, ProvisionError> {
        let at = self
            .find_anchor(anchor)
            .ok_or_else(|| ProvisionError::AnchorNotFound {
                path: self.path.clone(),
                anchor: anchor.to_string(),
            })?;

        // A final line without a terminator can only be the anchor itself or
        // follow it, so every line before `at` is already terminated.
        self.lines.splice(at..at, block.lines().iter().cloned());
        Ok(at)
    }
}

pub(crate) fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Leading whitespace of a line.
pub(crate) fn indent_of(line: &str) -> &str {
    let content = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - content.len()]
}

/// Confirm that `after` is `before` plus exactly one new entry for `tenant_key`.
///
/// `tenant_key` is matched by `is_tenant_entry`. Every entry that existed
/// before must still exist, in order, byte-for-byte.
pub fn verify_insertion(
    before: &Document,
    after: &Document,
    is_tenant_entry: impl Fn(&Section) -> bool,
) -> Result<(), ProvisionError> {
    let invalid = |reason: String| ProvisionError::InvalidDocument {
        path: after.path().to_path_buf(),
        reason,
    };

    let old_entries: Vec<Section> = before.sections().into_iter().filter(Section::is_entry).collect();
    if old_entries.iter().any(&is_tenant_entry) {
        return Err(invalid("tenant entry already present before insertion".to_string()));
    }

    let mut new_entries: Vec<Section> = after.sections().into_iter().filter(Section::is_entry).collect();
    let added: Vec<usize> = new_entries
        .iter()
        .enumerate()
        .filter(|(_, section)| is_tenant_entry(section))
        .map(|(index, _)| index)
        .collect();

    match added.as_slice() {
        [index] => {
            new_entries.remove(*index);
        }
        [] => return Err(invalid("inserted block does not parse as a tenant entry".to_string())),
        _ => {
            return Err(invalid(format!(
                "expected one tenant entry after insertion, found {}",
                added.len()
            )))
        }
    }

    if new_entries.len() != old_entries.len() {
        return Err(invalid(format!(
            "insertion changed the number of existing entries from {} to {}",
            old_entries.len(),
            new_entries.len()
        )));
    }

    for (old, new) in old_entries.iter().zip(&new_entries) {
        if old.kind != new.kind || old.text != new.text {
            return Err(invalid(format!(
                "existing entry starting at line {} changed during insertion",
                old.start + 1
            )));
        }
    }

    Ok(())
}
