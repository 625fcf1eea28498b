//! Tools for inspecting the physical structure of encoded byte strings.
//! Useful for debugging transformer coverage and verifying framing.

use crate::error::Result;
use crate::wire::{self, WireNode};
use serde::Serialize;

/// A structural report of an encoded byte string.
///
/// The report is produced without consulting transformers and without a
/// secret: a well-formed authentication prefix is detected and skipped,
/// **not** verified.
#[derive(Debug, Serialize)]
pub struct DebugReport {
    /// Total size of the byte string, prefix included.
    pub total_size: u64,
    /// Whether an authentication prefix is present.
    pub signed: bool,
    /// Whether the payload is an envelope (slow path) or a bare value.
    pub enveloped: bool,
    /// Class tags of every placeholder, in shortcut order for envelopes.
    pub stasis_tags: Vec<String>,
    /// The wire tree.
    pub tree: NodeInfo,
}

/// Metadata for a single node in the wire tree.
#[derive(Debug, Serialize)]
pub struct NodeInfo {
    /// Node kind (e.g. "array", "stasis", "shared").
    pub node_type: String,
    /// Extra info (class names, ids, entry counts).
    pub detail: Option<String>,
    /// Child nodes.
    pub children: Vec<NodeInfo>,
}

/// The Cryo inspector tool.
#[derive(Debug)]
pub struct CryoInspector;

impl CryoInspector {
    /// Analyzes a byte string and returns a structural report.
    pub fn inspect(bytes: &[u8]) -> Result<DebugReport> {
        let (signed, payload) = Self::split_signature(bytes);
        let node = wire::decode_node(payload)?;

        let mut tags = Vec::new();
        let tree = Self::inspect_node(&node, &mut tags);

        Ok(DebugReport {
            total_size: bytes.len() as u64,
            signed,
            enveloped: matches!(node, WireNode::Envelope { .. }),
            stasis_tags: tags,
            tree,
        })
    }

    fn split_signature(bytes: &[u8]) -> (bool, &[u8]) {
        let looks_signed = bytes.len() > 64
            && bytes[64] == b'|'
            && bytes[..64]
                .iter()
                .all(|b| matches!(*b, b'0'..=b'9' | b'a'..=b'f'));
        if looks_signed {
            (true, &bytes[65..])
        } else {
            (false, bytes)
        }
    }

    fn inspect_node(node: &WireNode, tags: &mut Vec<String>) -> NodeInfo {
        match node {
            WireNode::Null => Self::leaf("null", None),
            WireNode::Bool(b) => Self::leaf("bool", Some(b.to_string())),
            WireNode::Int(i) => Self::leaf("int", Some(i.to_string())),
            WireNode::Float(f) => Self::leaf("float", Some(f.to_string())),
            WireNode::Str(s) => Self::leaf("string", Some(format!("{} bytes", s.len()))),
            WireNode::Array { entries } => NodeInfo {
                node_type: "array".into(),
                detail: Some(format!("{} entries", entries.len())),
                children: entries
                    .iter()
                    .map(|(_, n)| Self::inspect_node(n, tags))
                    .collect(),
            },
            WireNode::Object { id, class, fields } => NodeInfo {
                node_type: "object".into(),
                detail: Some(match id {
                    Some(id) => format!("class {class}, id {id}"),
                    None => format!("class {class}"),
                }),
                children: fields
                    .iter()
                    .map(|(_, n)| Self::inspect_node(n, tags))
                    .collect(),
            },
            WireNode::Stasis {
                id,
                class_tag,
                payload,
            } => {
                tags.push(class_tag.clone());
                NodeInfo {
                    node_type: "stasis".into(),
                    detail: Some(match id {
                        Some(id) => format!("tag '{class_tag}', id {id}"),
                        None => format!("tag '{class_tag}'"),
                    }),
                    children: vec![Self::inspect_node(payload, tags)],
                }
            }
            WireNode::Shared { id, value } => NodeInfo {
                node_type: "shared".into(),
                detail: Some(format!("id {id}")),
                children: vec![Self::inspect_node(value, tags)],
            },
            WireNode::Ref(id) => Self::leaf("ref", Some(format!("id {id}"))),
            WireNode::Envelope { shortcuts, value } => {
                let mut children: Vec<NodeInfo> = shortcuts
                    .iter()
                    .map(|n| Self::inspect_node(n, tags))
                    .collect();
                children.push(Self::inspect_node(value, tags));
                NodeInfo {
                    node_type: "envelope".into(),
                    detail: Some(format!("{} shortcuts", shortcuts.len())),
                    children,
                }
            }
        }
    }

    fn leaf(node_type: &str, detail: Option<String>) -> NodeInfo {
        NodeInfo {
            node_type: node_type.into(),
            detail,
            children: Vec::new(),
        }
    }
}

impl std::fmt::Display for DebugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== CRYO INSPECTOR REPORT ===")?;
        writeln!(f, "Total Size:    {} bytes", self.total_size)?;
        writeln!(f, "Signed:        {}", self.signed)?;
        writeln!(f, "Enveloped:     {}", self.enveloped)?;
        writeln!(f, "Placeholders:  {}", self.stasis_tags.len())?;
        writeln!(f, "\n[WIRE LAYOUT]")?;
        self.tree.fmt_recursive(f, "", true)
    }
}

impl NodeInfo {
    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let detail = self
            .detail
            .as_deref()
            .map(|d| format!(" [{}]", d))
            .unwrap_or_default();

        writeln!(f, "{}{}{}{}", prefix, connector, self.node_type, detail)?;

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i == self.children.len() - 1;
            child.fmt_recursive(f, &format!("{}{}", prefix, child_prefix), is_last_child)?;
        }
        Ok(())
    }
}
