//! Topic namespace
//!
//! The taxonomy is declared once as a static tree and flattened at startup
//! into `identifier -> path`:
//! - every node emits its full path with a trailing `/` (`motion/status/on/`)
//! - every non-leaf node also emits `path#` under `identifier_all`
//!
//! Components resolve all of their topics when they are constructed, so an
//! unknown identifier fails the process at startup rather than at first use.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Suffix appended to a non-leaf identifier for its wildcard entry.
pub const WILDCARD_SUFFIX: &str = "_all";
const WILDCARD: char = '#';
const SEPARATOR: char = '/';

// ============================================================================
// Identifiers used by Vigil components
// ============================================================================

pub mod ids {
    pub const MOTION_ALL: &str = "motion_all";
    pub const MOTION_STATUS_ALL: &str = "motion_status_all";
    pub const MOTION_STATUS_ON: &str = "motion_status_on";
    pub const MOTION_STATUS_OFF: &str = "motion_status_off";
    pub const MOTION_DETECTED: &str = "motion_detected";
    pub const FILESYNC_QUEUE: &str = "motion_filesync_queue";
    pub const FILESYNC_START: &str = "motion_filesync_start";
    pub const FILESYNC_END: &str = "motion_filesync_end";
    pub const FILESYNC_CANCEL: &str = "motion_filesync_cancel";
    pub const FILESYNC_ERROR: &str = "motion_filesync_error";
    pub const NFC_SCAN: &str = "nfc_scan";
    pub const NFC_SCAN_ALL: &str = "nfc_scan_all";
    pub const NFC_SCAN_DATA: &str = "nfc_scan_data";
    pub const NFC_SCAN_AUTHORIZED: &str = "nfc_scan_authorized";
    pub const NFC_SCAN_FAULT: &str = "nfc_scan_fault";
    pub const INFO: &str = "info";
}

// ============================================================================
// Taxonomy
// ============================================================================

/// One node of the declared topic tree.
#[derive(Debug, Clone, Copy)]
pub struct TopicNode {
    pub segment: &'static str,
    pub children: &'static [TopicNode],
}

impl TopicNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The topic tree every Vigil process speaks.
pub static DEFAULT_TAXONOMY: &[TopicNode] = &[
    TopicNode {
        segment: "motion",
        children: &[
            TopicNode {
                segment: "status",
                children: &[
                    TopicNode { segment: "on", children: &[] },
                    TopicNode { segment: "off", children: &[] },
                ],
            },
            TopicNode { segment: "detected", children: &[] },
            TopicNode {
                segment: "filesync",
                children: &[
                    TopicNode { segment: "queue", children: &[] },
                    TopicNode { segment: "start", children: &[] },
                    TopicNode { segment: "end", children: &[] },
                    TopicNode { segment: "cancel", children: &[] },
                    TopicNode { segment: "error", children: &[] },
                ],
            },
        ],
    },
    TopicNode {
        segment: "nfc",
        children: &[TopicNode {
            segment: "scan",
            children: &[
                TopicNode { segment: "data", children: &[] },
                TopicNode { segment: "authorized", children: &[] },
                TopicNode { segment: "fault", children: &[] },
            ],
        }],
    },
    TopicNode { segment: "info", children: &[] },
];

// ============================================================================
// Topic
// ============================================================================

/// An immutable slash-delimited topic path, or a `#` wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with(WILDCARD)
    }

    /// Whether `topic` is covered by this pattern. A wildcard covers its
    /// whole subtree; anything else covers only itself.
    pub fn matches(&self, topic: &str) -> bool {
        match self.0.strip_suffix(WILDCARD) {
            Some(prefix) => topic.starts_with(prefix),
            None => self.0 == topic,
        }
    }

    /// Byte prefix for prefix-filtering transports.
    pub fn subscription_prefix(&self) -> &str {
        self.0.strip_suffix(WILDCARD).unwrap_or(&self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// Flat `identifier -> Topic` map built from a taxonomy.
#[derive(Debug, Clone)]
pub struct TopicNamespace {
    topics: BTreeMap<String, Topic>,
}

impl TopicNamespace {
    /// Flatten a taxonomy. Fails on empty or malformed segments and on
    /// identifier collisions (e.g. `a_b` vs `a/b`).
    pub fn from_taxonomy(taxonomy: &[TopicNode]) -> Result<Self> {
        let mut topics = BTreeMap::new();
        flatten(taxonomy, "", "", &mut topics)?;
        Ok(Self { topics })
    }

    /// Namespace over [`DEFAULT_TAXONOMY`].
    pub fn standard() -> Result<Self> {
        Self::from_taxonomy(DEFAULT_TAXONOMY)
    }

    pub fn get(&self, id: &str) -> Result<&Topic> {
        self.topics
            .get(id)
            .ok_or_else(|| ProtocolError::UnknownTopic(id.to_string()))
    }

    /// Owned lookup, for components that keep their resolved topics.
    pub fn require(&self, id: &str) -> Result<Topic> {
        self.get(id).cloned()
    }

    /// Identifiers that name a concrete topic (wildcards excluded).
    pub fn publishable(&self) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|(_, topic)| !topic.is_wildcard())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Topic)> {
        self.topics.iter().map(|(id, topic)| (id.as_str(), topic))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

fn flatten(
    nodes: &[TopicNode],
    parent_path: &str,
    parent_id: &str,
    out: &mut BTreeMap<String, Topic>,
) -> Result<()> {
    for node in nodes {
        validate_segment(node.segment)?;

        let path = format!("{}{}{}", parent_path, node.segment, SEPARATOR);
        let id = if parent_id.is_empty() {
            node.segment.to_string()
        } else {
            format!("{}_{}", parent_id, node.segment)
        };

        insert(out, id.clone(), path.clone())?;
        if !node.is_leaf() {
            insert(
                out,
                format!("{}{}", id, WILDCARD_SUFFIX),
                format!("{}{}", path, WILDCARD),
            )?;
            flatten(node.children, &path, &id, out)?;
        }
    }
    Ok(())
}

fn insert(out: &mut BTreeMap<String, Topic>, id: String, path: String) -> Result<()> {
    if let Some(existing) = out.get(&id) {
        return Err(ProtocolError::DuplicateTopic {
            id,
            first: existing.to_string(),
            second: path,
        });
    }
    out.insert(id, Topic(path));
    Ok(())
}

fn validate_segment(segment: &str) -> Result<()> {
    let reason = if segment.is_empty() {
        "empty"
    } else if segment.contains(SEPARATOR) {
        "contains '/'"
    } else if segment.contains(WILDCARD) {
        "contains '#'"
    } else {
        return Ok(());
    };
    Err(ProtocolError::InvalidSegment {
        segment: segment.to_string(),
        reason,
    })
}
