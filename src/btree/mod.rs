//! Disk-resident B+ Tree index engine
//!
//! The tree lives entirely in a slot file: slot 0 holds the header, slots
//! 1.. hold nodes in creation order, and a node's id is its slot number.
//! No node survives in memory between engine calls; every operation
//! re-reads the nodes it needs and writes back the ones it mutated.
//!
//! Splits are left-based: the left sibling keeps `order / 2` entries and,
//! at a leaf, additionally keeps the middle key while a copy of it is
//! promoted as the separator. Keeping the full key set in the leaf chain
//! is what lets ordered iteration run without touching internal nodes.

mod error;
mod iter;
mod node;

pub use error::{TreeError, TreeResult};
pub use iter::TreeIter;
pub use node::{NO_NODE, Node, NodeId, node_size, order_for_record_size};

use crate::Key;
use crate::store::{SharedSlotFile, Slot};

/// Magic number for index files: "SBPT" in ASCII
pub const MAGIC_NUMBER: u32 = 0x53425054;

/// Current index file version
pub const VERSION: u32 = 1;

/// Index header, persisted at slot 0 padded to one node slot.
#[derive(Debug, Clone, Copy)]
struct Header {
    root_id: NodeId,
    node_count: i64,
}

/// Exact-match result: the record slot plus the cursor position it was
/// found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry {
    pub slot: Slot,
    pub leaf_id: NodeId,
    pub pos: usize,
}

/// Outcome of a point lookup, with the disk-access count for the descent.
#[derive(Debug, Clone, Copy)]
pub struct Lookup {
    pub entry: Option<LeafEntry>,
    pub reads: usize,
}

/// Result of inserting into a subtree. A split hands the promoted
/// separator and the new right sibling straight to the parent frame.
enum Outcome {
    Inserted,
    Overflowed { sep_key: Key, right_id: NodeId },
}

/// Disk-persisted B+ tree over a shared slot file.
pub struct BPlusTree {
    store: SharedSlotFile,
    order: usize,
    node_bytes: usize,
    header: Header,
}

impl BPlusTree {
    /// Open a tree over `store`. The order is derived from the store's
    /// record size. An empty store is initialized with a single leaf root
    /// (id 1); otherwise the header is loaded and validated.
    pub fn open(store: SharedSlotFile) -> TreeResult<Self> {
        let (node_bytes, empty) = {
            let file = store.lock().unwrap();
            (file.record_size(), file.is_empty())
        };

        let order =
            order_for_record_size(node_bytes).ok_or(TreeError::BadNodeSize(node_bytes))?;
        if order < 3 {
            return Err(TreeError::InvalidOrder(order));
        }

        let mut tree = Self {
            store,
            order,
            node_bytes,
            header: Header {
                root_id: 1,
                node_count: 0,
            },
        };

        if empty {
            tree.header.node_count = 1;
            tree.write_header()?;
            tree.write_node(&Node::new(1, true))?;
        } else {
            tree.header = tree.read_header()?;
        }

        Ok(tree)
    }

    /// Tree order: the maximum key count before a node must split.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of nodes ever created (the header slot excluded).
    pub fn node_count(&self) -> i64 {
        self.header.node_count
    }

    /// Insert `(key, record_slot)`. Duplicate keys are accepted; callers
    /// wanting uniqueness check [`BPlusTree::contains`] first.
    pub fn insert(&mut self, key: Key, slot: Slot) -> TreeResult<()> {
        if let Outcome::Overflowed { sep_key, right_id } =
            self.insert_rec(self.header.root_id, key, slot)?
        {
            // Root overflow: a new root above the two halves, height +1.
            let mut root = self.alloc_node(false)?;
            root.keys.push(sep_key);
            root.children.push(self.header.root_id);
            root.children.push(right_id);
            self.write_node(&root)?;

            self.header.root_id = root.id;
            self.write_header()?;
        }
        Ok(())
    }

    /// Exact-match lookup reporting the disk-access count.
    pub fn find(&self, key: Key) -> TreeResult<Lookup> {
        let mut reads = 0;
        let mut node = self.read_node_counted(self.header.root_id, &mut reads)?;
        while !node.is_leaf {
            let pos = node.search_pos(key);
            node = self.read_node_counted(node.children[pos], &mut reads)?;
        }

        let pos = node.search_pos(key);
        let entry = if pos < node.key_count() && node.keys[pos] == key {
            Some(LeafEntry {
                slot: node.children[pos],
                leaf_id: node.id,
                pos,
            })
        } else {
            None
        };
        Ok(Lookup { entry, reads })
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: Key) -> TreeResult<bool> {
        Ok(self.find(key)?.entry.is_some())
    }

    /// Record slot of the first entry matching `key`, if any.
    pub fn search(&self, key: Key) -> TreeResult<Option<Slot>> {
        Ok(self.find(key)?.entry.map(|e| e.slot))
    }

    /// Record slots of all entries with `low <= key <= high`, in ascending
    /// key order: descend to the first key >= `low`, then walk the leaf
    /// chain until a key exceeds `high` or the chain ends.
    pub fn range_search(&self, low: Key, high: Key) -> TreeResult<Vec<Slot>> {
        let mut node = self.read_node(self.header.root_id)?;
        while !node.is_leaf {
            let pos = node.search_pos(low);
            node = self.read_node(node.children[pos])?;
        }

        let mut out = Vec::new();
        let mut pos = node.search_pos(low);
        loop {
            if pos == node.key_count() {
                if node.next == NO_NODE {
                    break;
                }
                node = self.read_node(node.next)?;
                pos = 0;
                continue;
            }
            if node.keys[pos] > high {
                break;
            }
            out.push(node.children[pos]);
            pos += 1;
        }
        Ok(out)
    }

    /// Cursor at the first entry, or the null sentinel if the tree is
    /// empty.
    pub fn begin(&self) -> TreeResult<TreeIter> {
        let mut node = self.read_node(self.header.root_id)?;
        while !node.is_leaf {
            node = self.read_node(node.children[0])?;
        }
        if node.key_count() == 0 {
            return Ok(self.null());
        }
        Ok(TreeIter::new(self.store.clone(), node.id, 0))
    }

    /// Cursor at the last entry, or the null sentinel if the tree is
    /// empty.
    pub fn end(&self) -> TreeResult<TreeIter> {
        let mut node = self.read_node(self.header.root_id)?;
        while !node.is_leaf {
            node = self.read_node(node.children[node.key_count()])?;
        }
        if node.key_count() == 0 {
            return Ok(self.null());
        }
        Ok(TreeIter::new(self.store.clone(), node.id, node.key_count() - 1))
    }

    /// The exhausted-cursor sentinel, used as the loop bound in both
    /// directions.
    pub fn null(&self) -> TreeIter {
        TreeIter::null(self.store.clone())
    }

    /// All keys in ascending order, scanned over the leaf chain.
    pub fn keys(&self) -> TreeResult<Vec<Key>> {
        let mut out = Vec::new();
        let mut cursor = self.begin()?;
        while !cursor.is_null() {
            out.push(cursor.key()?);
            cursor.advance()?;
        }
        Ok(out)
    }

    /// Walk the whole tree checking the stabilized balance invariant:
    /// no node exceeds `order` keys, and every node below the root's
    /// immediate children holds at least `order / 2`.
    pub fn validate(&self) -> TreeResult<()> {
        self.validate_node(self.header.root_id, 0)
    }

    fn validate_node(&self, id: NodeId, depth: usize) -> TreeResult<()> {
        let node = self.read_node(id)?;
        if node.key_count() > self.order {
            return Err(TreeError::CorruptNode(id));
        }
        if depth >= 2 && node.key_count() < self.order / 2 {
            return Err(TreeError::CorruptNode(id));
        }
        if !node.is_leaf {
            for &child in &node.children {
                self.validate_node(child, depth + 1)?;
            }
        }
        Ok(())
    }

    // ---- insert internals ----

    fn insert_rec(&mut self, node_id: NodeId, key: Key, slot: Slot) -> TreeResult<Outcome> {
        let mut node = self.read_node(node_id)?;
        let pos = node.search_pos(key);

        if node.is_leaf {
            node.insert_entry(pos, key, slot);
        } else {
            match self.insert_rec(node.children[pos], key, slot)? {
                // The child absorbed the insert; this node is untouched.
                Outcome::Inserted => return Ok(Outcome::Inserted),
                Outcome::Overflowed { sep_key, right_id } => {
                    node.insert_separator(pos, sep_key, right_id);
                }
            }
        }

        if node.is_overflow(self.order) {
            self.split(&mut node)
        } else {
            self.write_node(&node)?;
            Ok(Outcome::Inserted)
        }
    }

    /// Split an overflowing node in place: `left` keeps its id and the
    /// lower half, a fresh right sibling takes the upper half, and the
    /// middle key is promoted. At a leaf the middle key also stays in the
    /// left sibling and the chain is relinked across both halves.
    fn split(&mut self, left: &mut Node) -> TreeResult<Outcome> {
        let mid = self.order / 2;
        let sep_key = left.keys[mid];
        let mut right = self.alloc_node(left.is_leaf)?;

        right.keys = left.keys.split_off(mid + 1);
        right.children = left.children.split_off(mid + 1);
        if !left.is_leaf {
            // Internal split promotes the separator instead of keeping it.
            left.keys.truncate(mid);
        }

        if left.is_leaf {
            right.next = left.next;
            right.prev = left.id;
            left.next = right.id;
            if right.next != NO_NODE {
                let mut after = self.read_node(right.next)?;
                after.prev = right.id;
                self.write_node(&after)?;
            }
        }

        self.write_node(left)?;
        self.write_node(&right)?;

        Ok(Outcome::Overflowed {
            sep_key,
            right_id: right.id,
        })
    }

    // ---- node and header IO ----

    fn alloc_node(&mut self, is_leaf: bool) -> TreeResult<Node> {
        self.header.node_count += 1;
        self.write_header()?;
        Ok(Node::new(self.header.node_count, is_leaf))
    }

    fn read_node(&self, id: NodeId) -> TreeResult<Node> {
        let mut reads = 0;
        self.read_node_counted(id, &mut reads)
    }

    fn read_node_counted(&self, id: NodeId, reads: &mut usize) -> TreeResult<Node> {
        if id == NO_NODE {
            return Err(TreeError::CorruptNode(id));
        }
        let mut buf = vec![0u8; self.node_bytes];
        let found = self.store.lock().unwrap().retrieve_record(id, &mut buf)?;
        if !found {
            return Err(TreeError::CorruptNode(id));
        }
        *reads += 1;
        Ok(Node::decode(id, &buf))
    }

    fn write_node(&self, node: &Node) -> TreeResult<()> {
        let buf = node.encode(self.node_bytes);
        self.store.lock().unwrap().write_record(node.id, &buf)?;
        Ok(())
    }

    fn read_header(&self) -> TreeResult<Header> {
        let mut buf = vec![0u8; self.node_bytes];
        let found = self.store.lock().unwrap().retrieve_record(0, &mut buf)?;
        if !found {
            return Err(TreeError::CorruptNode(0));
        }

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC_NUMBER {
            return Err(TreeError::InvalidMagic);
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != VERSION {
            return Err(TreeError::UnsupportedVersion(version));
        }
        let stored = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        if stored != self.order {
            return Err(TreeError::OrderMismatch {
                stored,
                derived: self.order,
            });
        }

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[12..20]);
        let root_id = i64::from_le_bytes(bytes);
        bytes.copy_from_slice(&buf[20..28]);
        let node_count = i64::from_le_bytes(bytes);

        Ok(Header {
            root_id,
            node_count,
        })
    }

    fn write_header(&self) -> TreeResult<()> {
        let mut buf = vec![0u8; self.node_bytes];
        buf[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.order as u32).to_le_bytes());
        buf[12..20].copy_from_slice(&self.header.root_id.to_le_bytes());
        buf[20..28].copy_from_slice(&self.header.node_count.to_le_bytes());
        self.store.lock().unwrap().write_record(0, &buf)?;
        Ok(())
    }
}
