//! Session cursor
//!
//! Tracks which node of a conversation tree a session is standing on.
//! Every appended message becomes a child of the current node, so moving
//! the cursor to an earlier node and continuing is what creates branches.
//!
//! A cursor is single-owner state: it belongs to one session and is never
//! shared across tasks.

use crate::chat::tree::ConversationTree;
use crate::error::{Result, TangentError};

/// Lifecycle of a cursor.
///
/// The state is derived from what the cursor holds, not stored:
/// no tree is `Empty`, a tree without a position is `Loaded`, a tree
/// with a position is `Positioned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No conversation loaded
    Empty,
    /// Tree loaded, no active node yet
    Loaded,
    /// Tree loaded and an active node chosen
    Positioned,
}

/// Position tracker over a [`ConversationTree`].
#[derive(Debug, Default)]
pub struct SessionCursor {
    tree: Option<ConversationTree>,
    current: Option<String>,
}

impl SessionCursor {
    /// Creates an empty cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        match (&self.tree, &self.current) {
            (None, _) => CursorState::Empty,
            (Some(_), None) => CursorState::Loaded,
            (Some(_), Some(_)) => CursorState::Positioned,
        }
    }

    /// Takes ownership of a tree, dropping any previous position.
    pub fn load(&mut self, tree: ConversationTree) {
        self.tree = Some(tree);
        self.current = None;
    }

    /// Borrows the loaded tree.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::InvalidState`] when no tree is loaded.
    pub fn tree(&self) -> Result<&ConversationTree> {
        self.tree
            .as_ref()
            .ok_or_else(|| TangentError::InvalidState("no conversation loaded".to_string()))
    }

    /// Id of the active node, if positioned.
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Moves the cursor to an existing node.
    ///
    /// # Errors
    ///
    /// * [`TangentError::InvalidState`] - no tree is loaded
    /// * [`TangentError::NodeNotFound`] - the id is not in the tree
    pub fn position_at(&mut self, id: &str) -> Result<()> {
        let tree = self.tree()?;
        if !tree.contains(id) {
            return Err(TangentError::NodeNotFound(id.to_string()));
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Positions at the id the storage side reported as the most recent
    /// message of this conversation.
    ///
    /// # Errors
    ///
    /// Same conditions as [`position_at`](Self::position_at); a missing
    /// id here means storage and tree have diverged, which the caller
    /// should treat as data corruption.
    pub fn resolve_latest(&mut self, latest_id: &str) -> Result<()> {
        let tree = self.tree()?;
        if !tree.contains(latest_id) {
            return Err(TangentError::NodeNotFound(format!(
                "latest message {} is not part of the conversation tree",
                latest_id
            )));
        }
        self.current = Some(latest_id.to_string());
        Ok(())
    }

    /// Appends a node as a child of the current node and moves onto it.
    ///
    /// # Errors
    ///
    /// * [`TangentError::InvalidState`] - the cursor is not positioned
    /// * [`TangentError::Integrity`] - the id already exists in the tree
    pub fn append(&mut self, id: impl Into<String>) -> Result<()> {
        let current = self.current.clone().ok_or_else(|| {
            TangentError::InvalidState("cursor is not positioned on a node".to_string())
        })?;
        let id = id.into();
        let tree = self.tree.as_mut().ok_or_else(|| {
            TangentError::InvalidState("no conversation loaded".to_string())
        })?;
        tree.append_child(&current, id.clone())?;
        self.current = Some(id);
        Ok(())
    }

    /// Ordered node ids from the root to the current node.
    ///
    /// Returns an empty list when the cursor has no position; callers
    /// use that to render "nothing yet" rather than handle an error.
    pub fn current_path(&self) -> Vec<String> {
        match (&self.tree, &self.current) {
            (Some(tree), Some(current)) => tree.path_to_root(current).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Removes a subtree from the loaded tree.
    ///
    /// If the current node was inside the removed subtree, the cursor
    /// repositions to the removed branch's parent so it never points at
    /// a node that no longer exists.
    ///
    /// # Errors
    ///
    /// * [`TangentError::InvalidState`] - no tree is loaded
    /// * [`TangentError::NodeNotFound`] / [`TangentError::Validation`] -
    ///   propagated from [`ConversationTree::remove_subtree`]
    pub fn remove_subtree(&mut self, id: &str) -> Result<Vec<String>> {
        let tree = self.tree.as_mut().ok_or_else(|| {
            TangentError::InvalidState("no conversation loaded".to_string())
        })?;
        let parent = tree.parent(id)?.map(str::to_string);
        let removed = tree.remove_subtree(id)?;
        if let Some(current) = &self.current {
            if removed.contains(current) {
                self.current = parent;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_cursor() -> SessionCursor {
        let mut tree = ConversationTree::new("conv-1", "root");
        tree.append_child("root", "a").unwrap();
        tree.append_child("a", "b").unwrap();
        let mut cursor = SessionCursor::new();
        cursor.load(tree);
        cursor
    }

    #[test]
    fn test_state_transitions() {
        let mut cursor = SessionCursor::new();
        assert_eq!(cursor.state(), CursorState::Empty);

        cursor.load(ConversationTree::new("conv-1", "root"));
        assert_eq!(cursor.state(), CursorState::Loaded);

        cursor.position_at("root").unwrap();
        assert_eq!(cursor.state(), CursorState::Positioned);
    }

    #[test]
    fn test_load_drops_previous_position() {
        let mut cursor = loaded_cursor();
        cursor.position_at("b").unwrap();
        cursor.load(ConversationTree::new("conv-2", "r2"));
        assert_eq!(cursor.state(), CursorState::Loaded);
        assert!(cursor.current_id().is_none());
    }

    #[test]
    fn test_tree_access_requires_load() {
        let cursor = SessionCursor::new();
        assert!(matches!(
            cursor.tree(),
            Err(TangentError::InvalidState(_))
        ));
    }

    #[test]
    fn test_position_at_unknown_node_fails() {
        let mut cursor = loaded_cursor();
        let err = cursor.position_at("ghost").unwrap_err();
        assert!(matches!(err, TangentError::NodeNotFound(_)));
        assert_eq!(cursor.state(), CursorState::Loaded);
    }

    #[test]
    fn test_resolve_latest_positions_cursor() {
        let mut cursor = loaded_cursor();
        cursor.resolve_latest("b").unwrap();
        assert_eq!(cursor.current_id(), Some("b"));
    }

    #[test]
    fn test_resolve_latest_detects_divergence() {
        let mut cursor = loaded_cursor();
        let err = cursor.resolve_latest("not-in-tree").unwrap_err();
        assert!(matches!(err, TangentError::NodeNotFound(_)));
    }

    #[test]
    fn test_append_requires_position() {
        let mut cursor = loaded_cursor();
        let err = cursor.append("new").unwrap_err();
        assert!(matches!(err, TangentError::InvalidState(_)));
    }

    #[test]
    fn test_append_moves_cursor() {
        let mut cursor = loaded_cursor();
        cursor.position_at("b").unwrap();
        cursor.append("c").unwrap();
        assert_eq!(cursor.current_id(), Some("c"));
        assert_eq!(cursor.current_path(), ["root", "a", "b", "c"]);
    }

    #[test]
    fn test_append_duplicate_id_rejected() {
        let mut cursor = loaded_cursor();
        cursor.position_at("b").unwrap();
        let err = cursor.append("a").unwrap_err();
        assert!(matches!(err, TangentError::Integrity(_)));
        // The cursor stays where it was.
        assert_eq!(cursor.current_id(), Some("b"));
    }

    #[test]
    fn test_current_path_empty_when_unpositioned() {
        let cursor = SessionCursor::new();
        assert!(cursor.current_path().is_empty());

        let cursor = loaded_cursor();
        assert!(cursor.current_path().is_empty());
    }

    #[test]
    fn test_branching_via_reposition() {
        let mut cursor = loaded_cursor();
        cursor.position_at("a").unwrap();
        cursor.append("b2").unwrap();
        let tree = cursor.tree().unwrap();
        assert_eq!(tree.children("a").unwrap(), ["b", "b2"]);
    }

    #[test]
    fn test_remove_subtree_repositions_to_parent() {
        let mut cursor = loaded_cursor();
        cursor.position_at("b").unwrap();
        let removed = cursor.remove_subtree("a").unwrap();
        assert_eq!(removed, ["a", "b"]);
        assert_eq!(cursor.current_id(), Some("root"));
    }

    #[test]
    fn test_remove_subtree_elsewhere_keeps_position() {
        let mut cursor = loaded_cursor();
        cursor.position_at("root").unwrap();
        cursor.append("side").unwrap();
        cursor.remove_subtree("a").unwrap();
        assert_eq!(cursor.current_id(), Some("side"));
    }
}
