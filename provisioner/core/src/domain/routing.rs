// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Routing Document (nginx-style)
//!
//! One `server { ... }` block per tenant inside an enclosing context. The
//! document's final closing `}` is the insertion anchor, so new server blocks
//! land at the end of that context.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::document::{indent_of, Section, SectionKind};

static SERVER_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*server\s*\{").expect("server pattern is valid"));
static LISTEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*listen\s+(?:\S*:)?(\d+)\b").expect("listen pattern is valid")
});
static ROOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*root\s+([^;]+);").expect("root pattern is valid"));

/// Drop a trailing `#` comment, ignoring `#` inside quotes.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (index, ch) in line.char_indices() {
        match (ch, quote) {
            ('"' | '\'', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            ('#', None) => return &line[..index],
            _ => {}
        }
    }
    line
}

fn brace_delta(line: &str) -> i64 {
    let content = strip_comment(line);
    let mut quote: Option<char> = None;
    let mut delta = 0;
    for ch in content.chars() {
        match (ch, quote) {
            ('"' | '\'', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            ('{', None) => delta += 1,
            ('}', None) => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Check that braces balance and never close more than they open.
pub fn check_balance(lines: &[String]) -> Result<(), String> {
    let mut depth = 0i64;
    for (index, line) in lines.iter().enumerate() {
        depth += brace_delta(line);
        if depth < 0 {
            return Err(format!("unexpected '}}' on line {}", index + 1));
        }
    }
    if depth != 0 {
        return Err(format!("{} unclosed '{{' at end of document", depth));
    }
    Ok(())
}

/// Indentation of existing `server` blocks, or the closing delimiter's
/// indentation plus four spaces when there are none.
pub fn server_indent(lines: &[String]) -> String {
    if let Some(line) = lines.iter().find(|line| SERVER_OPEN.is_match(line)) {
        return indent_of(line).to_string();
    }
    let closing = lines
        .iter()
        .rev()
        .find(|line| strip_comment(line).trim() == "}")
        .map(|line| indent_of(line))
        .unwrap_or("");
    format!("{closing}    ")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split a routing document into sections.
///
/// Blank lines attach to the preceding section. A `server` block runs from
/// its opening line to the line that closes it.
pub fn sections(lines: &[String]) -> Vec<Section> {
    let closing = lines
        .iter()
        .rposition(|line| strip_comment(line).trim() == "}");

    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section::new(SectionKind::Preamble, 0);
    let mut server_depth: Option<i64> = None;
    let mut depth = 0i64;

    for (index, line) in lines.iter().enumerate() {
        if let Some(open_depth) = server_depth {
            current.text.push_str(line);
            record_server_directive(&mut current, line);
            depth += brace_delta(line);
            if depth <= open_depth {
                server_depth = None;
            }
            continue;
        }

        if Some(index) == closing {
            push(&mut sections, &mut current, Section::new(SectionKind::Closing, index));
        } else if current.kind == SectionKind::Closing || is_blank(line) {
            // trailing content after the anchor, or blank lines, stay where they are
        } else if SERVER_OPEN.is_match(line) {
            let server = SectionKind::Server {
                listen: Vec::new(),
                root: None,
            };
            push(&mut sections, &mut current, Section::new(server, index));
            server_depth = Some(depth);
            current.text.push_str(line);
            record_server_directive(&mut current, line);
            depth += brace_delta(line);
            if depth <= server_depth.unwrap_or(depth) {
                server_depth = None;
            }
            continue;
        } else if is_comment(line) {
            let continues = current.kind == SectionKind::Comment
                && current.text.lines().last().map(is_comment).unwrap_or(false);
            if !continues {
                push(&mut sections, &mut current, Section::new(SectionKind::Comment, index));
            }
        } else if !matches!(current.kind, SectionKind::Preamble | SectionKind::Text) {
            push(&mut sections, &mut current, Section::new(SectionKind::Text, index));
        }

        current.text.push_str(line);
        depth += brace_delta(line);
    }

    if !current.text.is_empty() {
        sections.push(current);
    }
    sections
}

fn push(sections: &mut Vec<Section>, current: &mut Section, next: Section) {
    let finished = std::mem::replace(current, next);
    if !finished.text.is_empty() {
        sections.push(finished);
    }
}

fn record_server_directive(section: &mut Section, line: &str) {
    let SectionKind::Server { listen, root } = &mut section.kind else {
        return;
    };
    let content = strip_comment(line);
    if let Some(port) = LISTEN
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
    {
        listen.push(port);
    }
    if root.is_none() {
        if let Some(path) = ROOT.captures(content).and_then(|c| c.get(1)) {
            *root = Some(path.as_str().trim().trim_matches('"').to_string());
        }
    }
}

/// Directory a tenant is mounted at: `template` up to and including the path
/// segment holding `{name}`, so `/var/www/{name}/public` gives `/var/www/app3`.
pub fn tenant_root(template: &str, name: &str) -> String {
    let end = match template.find("{name}") {
        Some(at) => {
            let after = at + "{name}".len();
            template[after..]
                .find('/')
                .map_or(template.len(), |offset| after + offset)
        }
        None => template.len(),
    };
    template[..end].replace("{name}", name)
}

/// Matches tenant names out of `root` directives built from a
/// `{name}`-templated document root such as `/var/www/{name}/public`.
#[derive(Debug, Clone)]
pub struct DocumentRootPattern {
    template: String,
    pattern: Regex,
}

impl DocumentRootPattern {
    pub fn new(template: &str) -> Result<Self, String> {
        if !template.contains("{name}") {
            return Err(format!("document root '{template}' has no {{name}} placeholder"));
        }
        let escaped = regex::escape(template).replace(r"\{name\}", "([a-z0-9][a-z0-9_-]*)");
        let pattern = Regex::new(&format!("^{escaped}/?$")).map_err(|e| e.to_string())?;
        Ok(Self {
            template: template.to_string(),
            pattern,
        })
    }

    pub fn render(&self, name: &str) -> String {
        self.template.replace("{name}", name)
    }

    pub fn tenant_of(&self, root: &str) -> Option<String> {
        self.pattern
            .captures(root)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}
