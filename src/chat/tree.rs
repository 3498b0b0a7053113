//! Conversation tree
//!
//! A conversation is a tree of message nodes: every reply is a child of
//! the message it answers, and editing an earlier message grows a new
//! sibling branch instead of rewriting history. The tree stores topology
//! only (node ids and child order); message payloads live in storage and
//! the cache.
//!
//! Nodes are kept in a map keyed by id, so lookups are O(1) and duplicate
//! ids are rejected at the moment they would enter the tree.

use crate::error::{Result, TangentError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First byte of a pickle protocol 2+ frame. Snapshots from the pre-JSON
/// era start with this marker and are refused outright.
const PICKLE_PROTO_MARKER: u8 = 0x80;

#[derive(Debug, Clone, PartialEq)]
struct TreeNode {
    parent: Option<String>,
    children: Vec<String>,
}

/// Serialized shape of a node: `{"id": "...", "children": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
struct NodeDump {
    id: String,
    #[serde(default)]
    children: Vec<NodeDump>,
}

/// Branching message topology for one conversation.
///
/// # Examples
///
/// ```
/// use tangent::ConversationTree;
///
/// let mut tree = ConversationTree::new("conv-1", "root");
/// tree.append_child("root", "reply-1").unwrap();
/// tree.append_child("root", "reply-2").unwrap();
///
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.children("root").unwrap(), ["reply-1", "reply-2"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTree {
    conversation_id: String,
    root_id: String,
    nodes: HashMap<String, TreeNode>,
}

impl ConversationTree {
    /// Creates a tree holding only its root node.
    pub fn new(conversation_id: impl Into<String>, root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            TreeNode {
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            conversation_id: conversation_id.into(),
            root_id,
            nodes,
        }
    }

    /// Id of the conversation this tree belongs to.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Id of the root node.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Whether a node id exists in the tree.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes in the tree (always at least 1).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True only for a tree that lost its nodes; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child ids of a node, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] if the id is not in the tree.
    pub fn children(&self, id: &str) -> Result<&[String]> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .ok_or_else(|| TangentError::NodeNotFound(id.to_string()))
    }

    /// Parent id of a node; `None` for the root.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] if the id is not in the tree.
    pub fn parent(&self, id: &str) -> Result<Option<&str>> {
        self.nodes
            .get(id)
            .map(|n| n.parent.as_deref())
            .ok_or_else(|| TangentError::NodeNotFound(id.to_string()))
    }

    /// Appends a new node as the last child of `parent_id`.
    ///
    /// # Errors
    ///
    /// * [`TangentError::NodeNotFound`] - the parent is not in the tree
    /// * [`TangentError::Integrity`] - the child id already exists
    ///   anywhere in the tree; node ids are globally unique
    pub fn append_child(&mut self, parent_id: &str, child_id: impl Into<String>) -> Result<()> {
        let child_id = child_id.into();
        if !self.nodes.contains_key(parent_id) {
            return Err(TangentError::NodeNotFound(parent_id.to_string()));
        }
        if self.nodes.contains_key(&child_id) {
            return Err(TangentError::Integrity(format!(
                "node id already present in tree: {}",
                child_id
            )));
        }
        self.nodes.insert(
            child_id.clone(),
            TreeNode {
                parent: Some(parent_id.to_string()),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(child_id);
        }
        Ok(())
    }

    /// Ordered node ids from the root down to `id`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] if the id is not in the
    /// tree, or [`TangentError::Integrity`] if the parent chain does not
    /// terminate (a corrupted tree).
    pub fn path_to_root(&self, id: &str) -> Result<Vec<String>> {
        if !self.nodes.contains_key(id) {
            return Err(TangentError::NodeNotFound(id.to_string()));
        }
        let mut path = vec![id.to_string()];
        let mut cursor = id;
        while let Some(node) = self.nodes.get(cursor) {
            let Some(parent) = node.parent.as_deref() else {
                break;
            };
            if path.len() > self.nodes.len() {
                return Err(TangentError::Integrity(format!(
                    "parent chain from {} exceeds tree size",
                    id
                )));
            }
            path.push(parent.to_string());
            cursor = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// The node and all of its descendants, depth-first.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::NodeNotFound`] if the id is not in the tree.
    pub fn subtree_ids(&self, id: &str) -> Result<Vec<String>> {
        if !self.nodes.contains_key(id) {
            return Err(TangentError::NodeNotFound(id.to_string()));
        }
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(current);
        }
        Ok(out)
    }

    /// Removes a node and its whole subtree, detaching it from its parent.
    ///
    /// Returns the removed ids so callers can delete the matching message
    /// payloads.
    ///
    /// # Errors
    ///
    /// * [`TangentError::Validation`] - removing the root; deleting the
    ///   whole conversation is a storage operation, not a tree edit
    /// * [`TangentError::NodeNotFound`] - the id is not in the tree
    pub fn remove_subtree(&mut self, id: &str) -> Result<Vec<String>> {
        if id == self.root_id {
            return Err(TangentError::Validation(
                "cannot remove the root node; delete the conversation instead".to_string(),
            ));
        }
        let removed = self.subtree_ids(id)?;
        let parent_id = self.nodes.get(id).and_then(|n| n.parent.clone());
        if let Some(pid) = parent_id {
            if let Some(parent) = self.nodes.get_mut(&pid) {
                parent.children.retain(|c| c != id);
            }
        }
        for rid in &removed {
            self.nodes.remove(rid);
        }
        Ok(removed)
    }

    /// Canonical JSON form: recursive `{"id", "children"}` objects,
    /// children in insertion order. Output is deterministic for a given
    /// tree.
    pub fn to_json(&self) -> Result<String> {
        let dump = self.dump_node(&self.root_id);
        Ok(serde_json::to_string(&dump)?)
    }

    /// Canonical UTF-8 bytes of [`to_json`](Self::to_json).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_json()?.into_bytes())
    }

    /// Reconstructs a tree from its canonical JSON form.
    ///
    /// A JSON `null` means "no tree" and yields `Ok(None)`; this is how
    /// the absence of a tree round-trips through storage.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::MalformedTree`] when the JSON cannot be
    /// parsed, a node is missing its `id`, or two nodes share an id.
    /// Unknown extra fields are ignored.
    pub fn from_json(conversation_id: impl Into<String>, json: &str) -> Result<Option<Self>> {
        let dump: Option<NodeDump> = serde_json::from_str(json)
            .map_err(|e| TangentError::MalformedTree(format!("undecodable tree JSON: {}", e)))?;
        match dump {
            None => Ok(None),
            Some(dump) => Self::from_dump(conversation_id.into(), dump).map(Some),
        }
    }

    /// Reconstructs a tree from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::UnsupportedLegacyFormat`] for pre-JSON
    /// binary snapshots (non-UTF-8 data, or bytes starting with the
    /// pickle protocol marker); such data is refused before any parsing.
    /// Otherwise behaves like [`from_json`](Self::from_json).
    pub fn from_bytes(conversation_id: impl Into<String>, bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.first() == Some(&PICKLE_PROTO_MARKER) {
            return Err(TangentError::UnsupportedLegacyFormat);
        }
        let text =
            std::str::from_utf8(bytes).map_err(|_| TangentError::UnsupportedLegacyFormat)?;
        Self::from_json(conversation_id, text)
    }

    fn dump_node(&self, id: &str) -> NodeDump {
        let children = self
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        NodeDump {
            id: id.to_string(),
            children: children.iter().map(|c| self.dump_node(c)).collect(),
        }
    }

    fn from_dump(conversation_id: String, dump: NodeDump) -> Result<Self> {
        let root_id = dump.id;
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            TreeNode {
                parent: None,
                children: Vec::new(),
            },
        );

        // Iterative pre-order walk; parent ids pair each pending dump.
        let mut stack: Vec<(String, NodeDump)> = dump
            .children
            .into_iter()
            .rev()
            .map(|c| (root_id.clone(), c))
            .collect();
        while let Some((parent_id, node)) = stack.pop() {
            if nodes.contains_key(&node.id) {
                return Err(TangentError::MalformedTree(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            nodes.insert(
                node.id.clone(),
                TreeNode {
                    parent: Some(parent_id.clone()),
                    children: Vec::new(),
                },
            );
            if let Some(parent) = nodes.get_mut(&parent_id) {
                parent.children.push(node.id.clone());
            }
            for child in node.children.into_iter().rev() {
                stack.push((node.id.clone(), child));
            }
        }

        Ok(Self {
            conversation_id,
            root_id,
            nodes,
        })
    }
}
