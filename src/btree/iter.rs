//! Bidirectional cursor over the ordered leaf chain
//!
//! A cursor is just `(leaf_id, position)` plus a handle to the backing
//! store, not to the engine, so it stays valid across engine calls. Every
//! step re-reads the current leaf from disk.

use crate::Key;
use crate::store::{SharedSlotFile, Slot};

use super::error::{TreeError, TreeResult};
use super::node::{NO_NODE, Node, NodeId};

/// Cursor over the leaf chain. The null sentinel (`leaf_id = -1`) marks
/// exhaustion in both directions; stepping the sentinel is a no-op.
pub struct TreeIter {
    store: SharedSlotFile,
    leaf_id: NodeId,
    pos: usize,
}

impl TreeIter {
    pub(crate) fn new(store: SharedSlotFile, leaf_id: NodeId, pos: usize) -> Self {
        Self {
            store,
            leaf_id,
            pos,
        }
    }

    pub(crate) fn null(store: SharedSlotFile) -> Self {
        Self {
            store,
            leaf_id: NO_NODE,
            pos: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.leaf_id == NO_NODE
    }

    /// Leaf this cursor points into, `NO_NODE` for the sentinel.
    pub fn leaf_id(&self) -> NodeId {
        self.leaf_id
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Step forward; past the last entry of a leaf the cursor moves to
    /// `next_id` at position 0, or becomes the sentinel at the chain end.
    pub fn advance(&mut self) -> TreeResult<()> {
        if self.is_null() {
            return Ok(());
        }
        let node = self.read_leaf(self.leaf_id)?;
        self.pos += 1;
        if self.pos >= node.key_count() {
            self.leaf_id = node.next;
            self.pos = 0;
        }
        Ok(())
    }

    /// Step backward; before the first entry of a leaf the cursor moves to
    /// the last entry of `prev_id`, or becomes the sentinel at the chain
    /// start.
    pub fn retreat(&mut self) -> TreeResult<()> {
        if self.is_null() {
            return Ok(());
        }
        if self.pos > 0 {
            self.pos -= 1;
            return Ok(());
        }
        let node = self.read_leaf(self.leaf_id)?;
        self.leaf_id = node.prev;
        if self.leaf_id != NO_NODE {
            let prev = self.read_leaf(self.leaf_id)?;
            self.pos = prev.key_count().saturating_sub(1);
        } else {
            self.pos = 0;
        }
        Ok(())
    }

    /// Key under the cursor. Fails with [`TreeError::NullCursor`] on the
    /// sentinel.
    pub fn key(&self) -> TreeResult<Key> {
        Ok(self.entry()?.0)
    }

    /// `(key, record_slot)` under the cursor.
    pub fn entry(&self) -> TreeResult<(Key, Slot)> {
        if self.is_null() {
            return Err(TreeError::NullCursor);
        }
        let node = self.read_leaf(self.leaf_id)?;
        match (node.keys.get(self.pos), node.children.get(self.pos)) {
            (Some(&key), Some(&slot)) => Ok((key, slot)),
            _ => Err(TreeError::CorruptNode(self.leaf_id)),
        }
    }

    fn read_leaf(&self, id: NodeId) -> TreeResult<Node> {
        let mut store = self.store.lock().unwrap();
        let mut buf = vec![0u8; store.record_size()];
        if !store.retrieve_record(id, &mut buf)? {
            return Err(TreeError::CorruptNode(id));
        }
        Ok(Node::decode(id, &buf))
    }
}

impl PartialEq for TreeIter {
    /// Cursors are equal iff they address the same leaf and position; the
    /// store handle does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.leaf_id == other.leaf_id && self.pos == other.pos
    }
}

impl Eq for TreeIter {}

impl std::fmt::Debug for TreeIter {
    /// Mirrors `PartialEq`: only the leaf and position identify a cursor.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIter")
            .field("leaf_id", &self.leaf_id)
            .field("pos", &self.pos)
            .finish()
    }
}
