//! Tagged configuration tree for the cluster membership file
//!
//! The membership definition file is a nested block format: a section opens
//! with `name {`, closes with `}`, and carries `key: value` attribute lines.
//! Sections nest arbitrarily. Serialization writes attributes in sorted key
//! order, so parse/serialize round-trips modulo attribute ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("line {line}: {message}")]
pub struct TreeParseError {
    pub line: usize,
    pub message: String,
}

/// One tagged section: name, attributes, child sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<SectionNode>,
}

impl SectionNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// First child section with the given tag
    pub fn child(&self, name: &str) -> Option<&SectionNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut SectionNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Locate a child by tag and the value of a key attribute, e.g. the
    /// `node` section whose `name` attribute is a given member name.
    pub fn find_child(&self, name: &str, attr_key: &str, attr_value: &str) -> Option<&SectionNode> {
        self.children
            .iter()
            .find(|c| c.name == name && c.attribute(attr_key) == Some(attr_value))
    }

    pub fn find_child_mut(
        &mut self,
        name: &str,
        attr_key: &str,
        attr_value: &str,
    ) -> Option<&mut SectionNode> {
        self.children
            .iter_mut()
            .find(|c| c.name == name && c.attribute(attr_key) == Some(attr_value))
    }

    pub fn push_child(&mut self, child: SectionNode) {
        self.children.push(child);
    }

    /// Remove all children matching tag + key attribute; true if any removed
    pub fn remove_child(&mut self, name: &str, attr_key: &str, attr_value: &str) -> bool {
        let before = self.children.len();
        self.children
            .retain(|c| !(c.name == name && c.attribute(attr_key) == Some(attr_value)));
        self.children.len() != before
    }

    /// Parse a document with exactly one top-level section
    pub fn parse(input: &str) -> std::result::Result<SectionNode, TreeParseError> {
        let mut stack: Vec<SectionNode> = Vec::new();
        let mut root: Option<SectionNode> = None;

        for (idx, raw_line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_suffix('{') {
                let name = name.trim();
                if name.is_empty() {
                    return Err(TreeParseError {
                        line: line_no,
                        message: "section opened without a name".to_string(),
                    });
                }
                if stack.is_empty() && root.is_some() {
                    return Err(TreeParseError {
                        line: line_no,
                        message: "multiple top-level sections".to_string(),
                    });
                }
                stack.push(SectionNode::new(name));
            } else if line == "}" {
                let done = stack.pop().ok_or_else(|| TreeParseError {
                    line: line_no,
                    message: "unmatched closing brace".to_string(),
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            } else if let Some((key, value)) = line.split_once(':') {
                let section = stack.last_mut().ok_or_else(|| TreeParseError {
                    line: line_no,
                    message: "attribute outside of a section".to_string(),
                })?;
                section
                    .attributes
                    .insert(key.trim().to_string(), value.trim().to_string());
            } else {
                return Err(TreeParseError {
                    line: line_no,
                    message: format!("unrecognized line: {:?}", line),
                });
            }
        }

        if !stack.is_empty() {
            return Err(TreeParseError {
                line: input.lines().count(),
                message: format!("unclosed section '{}'", stack.last().map(|s| s.name.as_str()).unwrap_or("")),
            });
        }
        root.ok_or_else(|| TreeParseError {
            line: 0,
            message: "empty document".to_string(),
        })
    }

    fn write_indented(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        out.push_str(&pad);
        out.push_str(&self.name);
        out.push_str(" {\n");
        for (key, value) in &self.attributes {
            out.push_str(&pad);
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        for child in &self.children {
            child.write_indented(out, depth + 1);
        }
        out.push_str(&pad);
        out.push_str("}\n");
    }
}

impl fmt::Display for SectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_indented(&mut out, 0);
        f.write_str(&out)
    }
}
