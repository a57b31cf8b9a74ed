use std::collections::HashMap;

use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::tags::StreamOffset;

/// Detects cycles in the `next` links between directories.
///
/// Every directory has at most one successor, so the links form a forest of chains. A malicious
/// file can point a later directory back at an earlier one, which would make traversal loop
/// forever. Directories are not necessarily visited in chain order, so each offset is assigned
/// to a chain with union find and a new link is rejected when both ends already share a chain.
#[derive(Default, Debug)]
pub struct IfdCycles {
    /// Successor of every directory seen so far, `None` at the end of a chain.
    links: HashMap<StreamOffset, Option<StreamOffset>>,
    /// Union-find parent pointers, a root points at itself.
    parents: HashMap<StreamOffset, StreamOffset>,
}

impl IfdCycles {
    pub fn new() -> Self {
        IfdCycles::default()
    }

    /// Record that the directory at `from` links to `to`.
    ///
    /// Returns `false` if the same link was recorded before.
    pub fn insert_next(&mut self, from: StreamOffset, to: Option<StreamOffset>) -> TiffResult<bool> {
        match self.links.get(&from) {
            Some(existing) if *existing == to => return Ok(false),
            // Two different reads of the same directory.
            Some(_) => return Err(cycle()),
            None => {}
        }
        self.links.insert(from, to);

        let from_root = self.root(from);
        if let Some(to) = to {
            let to_root = self.root(to);
            if from_root == to_root {
                return Err(cycle());
            }
            self.parents.insert(to_root, from_root);
        }

        Ok(true)
    }

    /// The representative of the chain holding `node`, registering it if new.
    fn root(&mut self, node: StreamOffset) -> StreamOffset {
        let mut root = *self.parents.entry(node).or_insert(node);
        while let Some(&parent) = self.parents.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = node;
        while current != root {
            let parent = self.parents[&current];
            self.parents.insert(current, root);
            current = parent;
        }

        root
    }
}

fn cycle() -> TiffError {
    TiffError::FormatError(TiffFormatError::CycleInOffsets)
}
