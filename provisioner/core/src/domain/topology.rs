// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Topology Document (compose YAML)
//!
//! Two views of the same file:
//!
//! - [`sections`]: a line-level split into preamble, comments, one section
//!   per entry under `services:` and one per trailing top-level key. Used for
//!   insertion and structural verification, so it never loses a byte.
//! - [`TopologyView`]: a `serde_yaml` parse used to read values (published
//!   ports, tenant environment) for the registry.

use serde_yaml::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::document::{indent_of, strip_terminator, Section, SectionKind};

/// Environment keys carrying tenant identifiers.
pub const ENV_APP_NAME: &str = "APP_NAME";
pub const ENV_PORT: &str = "APP_PORT";
pub const ENV_DATABASE: &str = "DB_DATABASE";
pub const ENV_CACHE_NAMESPACE: &str = "REDIS_DB";
pub const ENV_CACHE_PREFIX: &str = "CACHE_PREFIX";
pub const ENV_QUEUE: &str = "REDIS_QUEUE";

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing top-level 'services' mapping")]
    MissingServices,

    #[error("'services' is not a mapping")]
    ServicesNotMapping,
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn key_of(line: &str) -> String {
    let content = strip_terminator(line).trim();
    let key = content.split(':').next().unwrap_or(content);
    key.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Indentation of entries under `services:`, or two spaces when there are none.
pub fn service_indent(lines: &[String]) -> String {
    let mut in_services = false;
    for line in lines {
        if !in_services {
            if indent_of(line).is_empty() && key_of(line) == "services" {
                in_services = true;
            }
            continue;
        }
        if is_blank(line) || is_comment(line) {
            continue;
        }
        let indent = indent_of(line);
        if indent.is_empty() {
            break;
        }
        return indent.to_string();
    }
    "  ".to_string()
}

/// Split a compose document into sections.
///
/// Blank lines attach to the section before them. Comment lines at or above
/// service indentation start a `Comment` section; deeper comments belong to
/// the service they sit in.
pub fn sections(lines: &[String]) -> Vec<Section> {
    let indent = service_indent(lines);
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section::new(SectionKind::Preamble, 0);
    let mut in_services = false;
    let mut seen_services = false;

    for (index, line) in lines.iter().enumerate() {
        let line_indent = indent_of(line);
        let boundary = if is_blank(line) {
            None
        } else if line_indent.is_empty() && !is_comment(line) {
            let key = key_of(line);
            if !seen_services && key == "services" {
                // `services:` closes the preamble.
                current.text.push_str(line);
                in_services = true;
                seen_services = true;
                continue;
            }
            in_services = false;
            if seen_services {
                Some(SectionKind::TopLevel { key })
            } else {
                None
            }
        } else if is_comment(line) && seen_services && line_indent.len() <= indent.len() {
            let continues_comment = current.kind == SectionKind::Comment
                && current.text.lines().last().map(is_comment).unwrap_or(false);
            if continues_comment {
                None
            } else {
                Some(SectionKind::Comment)
            }
        } else if in_services && !is_comment(line) && line_indent == indent {
            Some(SectionKind::Service { name: key_of(line) })
        } else {
            None
        };

        if let Some(kind) = boundary {
            if !current.text.is_empty() {
                sections.push(current);
            }
            current = Section::new(kind, index);
        }
        current.text.push_str(line);
    }

    if !current.text.is_empty() {
        sections.push(current);
    }
    sections
}

/// Value-level view of a compose document.
#[derive(Debug, Clone, Default)]
pub struct TopologyView {
    pub services: Vec<ServiceView>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceView {
    pub name: String,
    /// Host ports published through `ports:`.
    pub published_ports: Vec<u16>,
    pub environment: BTreeMap<String, String>,
}

impl ServiceView {
    pub fn env_str(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }

    pub fn env_u32(&self, key: &str) -> Option<u32> {
        self.environment.get(key).and_then(|v| v.trim().parse().ok())
    }
}

impl TopologyView {
    pub fn parse(text: &str) -> Result<Self, TopologyError> {
        let root: Value = serde_yaml::from_str(text)?;
        let Some(services) = root.get("services") else {
            return Err(TopologyError::MissingServices);
        };
        let Some(services) = services.as_mapping() else {
            if services.is_null() {
                return Ok(Self::default());
            }
            return Err(TopologyError::ServicesNotMapping);
        };

        let services = services
            .iter()
            .filter_map(|(name, body)| {
                let name = scalar_to_string(name)?;
                Some(ServiceView {
                    published_ports: body.get("ports").map(published_ports).unwrap_or_default(),
                    environment: body.get("environment").map(environment).unwrap_or_default(),
                    name,
                })
            })
            .collect();

        Ok(Self { services })
    }

    pub fn service(&self, name: &str) -> Option<&ServiceView> {
        self.services.iter().find(|service| service.name == name)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `environment:` as either a mapping or a list of `KEY=VALUE` strings.
fn environment(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Mapping(map) => map
            .iter()
            .filter_map(|(k, v)| Some((scalar_to_string(k)?, scalar_to_string(v).unwrap_or_default())))
            .collect(),
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| {
                let entry = item.as_str()?;
                let (key, val) = entry.split_once('=').unwrap_or((entry, ""));
                Some((key.to_string(), val.to_string()))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn published_ports(value: &Value) -> Vec<u16> {
    let Some(items) = value.as_sequence() else {
        return Vec::new();
    };
    items.iter().flat_map(published_ports_of).collect()
}

/// Host ports of one `ports:` entry. Short syntax
/// (`"8081:80"`, `"127.0.0.1:3306:3306"`, `"8000-8002:8000-8002/tcp"`) and
/// long syntax (`published: 8080`) are both understood. A bare container
/// port publishes nothing fixed.
fn published_ports_of(entry: &Value) -> Vec<u16> {
    if let Some(map) = entry.as_mapping() {
        return map
            .get("published")
            .and_then(scalar_to_string)
            .map(|spec| parse_port_range(&spec))
            .unwrap_or_default();
    }

    let Some(spec) = scalar_to_string(entry) else {
        return Vec::new();
    };
    let spec = spec.split('/').next().unwrap_or_default();
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [host, _container] => parse_port_range(host),
        [_ip, host, _container] => parse_port_range(host),
        _ => Vec::new(),
    }
}

fn parse_port_range(spec: &str) -> Vec<u16> {
    let spec = spec.trim();
    match spec.split_once('-') {
        Some((lo, hi)) => match (lo.parse::<u16>(), hi.parse::<u16>()) {
            (Ok(lo), Ok(hi)) if lo <= hi => (lo..=hi).collect(),
            _ => Vec::new(),
        },
        None => spec.parse::<u16>().map(|p| vec![p]).unwrap_or_default(),
    }
}
