//! Ordered scans over one index, honouring a comparison operator.

use crate::btree::{BPlusTree, IndexKey, NodeId};
use crate::condition::CompOp;
use crate::record::RecordId;

/// Walks the linked leaves of a B+ tree, yielding the RIDs whose keys
/// satisfy `key <op> bound`. The starting leaf and the stop predicate are
/// chosen from the operator; a NULL bound yields nothing (comparisons with
/// NULL are unknown), and NULL keys in the tree are never yielded.
pub struct IndexScanner<'a> {
    tree: &'a BPlusTree,
    op: CompOp,
    bound: IndexKey,
    pos: Option<(NodeId, usize)>,
}

impl<'a> IndexScanner<'a> {
    pub fn new(tree: &'a BPlusTree, op: CompOp, bound: IndexKey) -> Self {
        let pos = if bound.is_null() {
            None
        } else {
            match op {
                // Start at the first candidate key
                CompOp::Eq | CompOp::Ge => tree.lower_bound(&bound),
                CompOp::Gt => {
                    // Skip the run of equal keys
                    let mut pos = tree.lower_bound(&bound);
                    while let Some(p) = pos {
                        match tree.entry_at(p) {
                            Some((k, _)) if *k == bound => pos = tree.next_position(p),
                            _ => break,
                        }
                    }
                    pos
                }
                // Everything below (or besides) the bound starts at the front
                CompOp::Lt | CompOp::Le | CompOp::Ne => tree.first_position(),
                // IS NULL / IS NOT NULL never reach the index layer
                CompOp::IsNull | CompOp::IsNotNull => None,
            }
        };

        Self {
            tree,
            op,
            bound,
            pos,
        }
    }

    /// Next matching RID, or None at end of scan
    pub fn next_entry(&mut self) -> Option<RecordId> {
        loop {
            let pos = self.pos?;
            let (key, rid) = self.tree.entry_at(pos)?;

            // NULL keys sort after all values; reaching them ends any scan
            if key.is_null() {
                self.pos = None;
                return None;
            }

            let (emit, stop) = match self.op {
                CompOp::Eq => {
                    let eq = *key == self.bound;
                    (eq, !eq)
                }
                CompOp::Ne => (*key != self.bound, false),
                CompOp::Lt => {
                    let lt = *key < self.bound;
                    (lt, !lt)
                }
                CompOp::Le => {
                    let le = *key <= self.bound;
                    (le, !le)
                }
                CompOp::Gt | CompOp::Ge => (true, false),
                CompOp::IsNull | CompOp::IsNotNull => (false, true),
            };

            if stop {
                self.pos = None;
                return None;
            }

            self.pos = self.tree.next_position(pos);
            if emit {
                return Some(rid);
            }
        }
    }

    /// Drain the scanner into a RID list
    pub fn collect_rids(mut self) -> Vec<RecordId> {
        let mut rids = Vec::new();
        while let Some(rid) = self.next_entry() {
            rids.push(rid);
        }
        rids
    }
}
