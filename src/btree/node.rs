//! Tree node and its fixed-layout codec
//!
//! Every node occupies exactly one slot of the index file. The layout is
//! little-endian:
//!
//! | field     | bytes          |
//! |-----------|----------------|
//! | is_leaf   | 1              |
//! | reserved  | 1              |
//! | key_count | 2 (u16)        |
//! | prev_id   | 8 (i64, -1 = none) |
//! | next_id   | 8 (i64, -1 = none) |
//! | keys      | (order + 1) x 8 |
//! | children  | (order + 2) x 8 |
//!
//! The extra key and child slots hold the transient overflow state during a
//! split; persisted nodes never exceed `order` keys.

use crate::Key;

/// Node identifier: the node's slot number in the index file.
pub type NodeId = i64;

/// Absent node link (chain ends, internal nodes, null cursor).
pub const NO_NODE: NodeId = -1;

/// Fixed bytes before the key array.
pub const NODE_HEADER_SIZE: usize = 20;

/// Byte size of one encoded node for a given order.
pub fn node_size(order: usize) -> usize {
    NODE_HEADER_SIZE + (order + 1) * 8 + (order + 2) * 8
}

/// Invert [`node_size`]: the order whose nodes fill `record_size` exactly.
pub fn order_for_record_size(record_size: usize) -> Option<usize> {
    let payload = record_size.checked_sub(NODE_HEADER_SIZE + 24)?;
    if payload % 16 != 0 {
        return None;
    }
    Some(payload / 16)
}

/// A single tree node, read from disk, mutated locally and written back.
/// No node outlives the engine call that read it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// This node's own slot number.
    pub id: NodeId,
    pub is_leaf: bool,
    /// Keys, sorted ascending.
    pub keys: Vec<Key>,
    /// Internal nodes: child node ids, one more than `keys` (child `i`
    /// holds keys below `keys[i]`). Leaf nodes: record slots parallel to
    /// `keys`.
    pub children: Vec<i64>,
    /// Leaf-chain links; `NO_NODE` for internal nodes and chain ends.
    pub prev: NodeId,
    pub next: NodeId,
}

impl Node {
    pub fn new(id: NodeId, is_leaf: bool) -> Self {
        Self {
            id,
            is_leaf,
            keys: Vec::new(),
            children: Vec::new(),
            prev: NO_NODE,
            next: NO_NODE,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Index of the first key >= `key`, or `key_count` if none.
    /// Used both to pick the child during descent and to find the sorted
    /// insert position in a leaf.
    pub fn search_pos(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k < key)
    }

    /// Insert a `(key, record_slot)` entry at `pos`, shifting later
    /// entries right. Leaf nodes only.
    pub fn insert_entry(&mut self, pos: usize, key: Key, slot: i64) {
        debug_assert!(self.is_leaf);
        self.keys.insert(pos, key);
        self.children.insert(pos, slot);
    }

    /// Insert a promoted separator and its right sibling after a child
    /// split. Internal nodes only: the old child stays at `pos`, the new
    /// right sibling lands at `pos + 1`.
    pub fn insert_separator(&mut self, pos: usize, key: Key, right_id: NodeId) {
        debug_assert!(!self.is_leaf);
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, right_id);
    }

    /// Transient state resolved by splitting before the insert returns.
    pub fn is_overflow(&self, order: usize) -> bool {
        self.key_count() > order
    }

    /// Encode into a buffer of exactly `record_size` bytes.
    pub fn encode(&self, record_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; record_size];

        buf[0] = self.is_leaf as u8;
        buf[2..4].copy_from_slice(&(self.keys.len() as u16).to_le_bytes());
        buf[4..12].copy_from_slice(&self.prev.to_le_bytes());
        buf[12..20].copy_from_slice(&self.next.to_le_bytes());

        let mut offset = NODE_HEADER_SIZE;
        for &key in &self.keys {
            buf[offset..offset + 8].copy_from_slice(&key.to_le_bytes());
            offset += 8;
        }

        let order = order_for_record_size(record_size).unwrap_or(0);
        offset = NODE_HEADER_SIZE + (order + 1) * 8;
        for &child in &self.children {
            buf[offset..offset + 8].copy_from_slice(&child.to_le_bytes());
            offset += 8;
        }

        buf
    }

    /// Decode a node read from slot `id`. The id is not stored on disk;
    /// it is the slot the bytes came from.
    pub fn decode(id: NodeId, buf: &[u8]) -> Self {
        let is_leaf = buf[0] != 0;
        let key_count = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let prev = read_i64(buf, 4);
        let next = read_i64(buf, 12);

        let mut keys = Vec::with_capacity(key_count);
        let mut offset = NODE_HEADER_SIZE;
        for _ in 0..key_count {
            keys.push(read_i64(buf, offset));
            offset += 8;
        }

        // Leaf children are record slots parallel to keys; internal nodes
        // carry one more child than keys.
        let child_count = if is_leaf { key_count } else { key_count + 1 };
        let order = order_for_record_size(buf.len()).unwrap_or(0);
        let mut children = Vec::with_capacity(child_count);
        offset = NODE_HEADER_SIZE + (order + 1) * 8;
        for _ in 0..child_count {
            children.push(read_i64(buf, offset));
            offset += 8;
        }

        Self {
            id,
            is_leaf,
            keys,
            children,
            prev,
            next,
        }
    }
}

fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}
