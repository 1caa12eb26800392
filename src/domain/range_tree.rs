//! Lazy multiplicative range tree over per-bin weights.
//!
//! Nodes live in a growable arena and reference their children by index.
//! Index `0` is the root, so a child index of `0` means "not allocated":
//! such a node stands for a subtree whose weight is spread uniformly over
//! its bins and whose stored sum is authoritative. Children are allocated
//! only when an update has to tell the two halves apart, so memory grows
//! with the number of distinct ranges ever touched rather than with the
//! bin count.
//!
//! Every node keeps `sum` up to date even while a multiplier is still
//! deferred in `pending`. Reads never mutate: a partially covered node
//! applies its own pending factor to the sum returned by its children.
//!
//! Mutations run inside [`RangeTree::atomically`], which journals node
//! overwrites and arena growth and undoes them if the operation fails.

use tracing::debug;

use super::error::{ClmsrError, Result};
use super::fixed_point::{Composition, Rounding, Wad, compose_factors, validate_factor};

/// Largest number of bins a single tree may hold.
pub const MAX_BIN_COUNT: u32 = 1_000_000;

const ROOT: u32 = 0;
const NO_CHILD: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    sum: Wad,
    pending: Wad,
    left: u32,
    right: u32,
}

impl Node {
    const fn uniform(sum: Wad) -> Self {
        Self {
            sum,
            pending: Wad::ONE,
            left: NO_CHILD,
            right: NO_CHILD,
        }
    }

    const fn has_children(&self) -> bool {
        self.left != NO_CHILD
    }
}

/// Undo log for one atomic operation.
#[derive(Debug)]
struct Journal {
    arena_len: usize,
    entries: Vec<(u32, Node)>,
    flushes: u64,
}

/// Read position during a query: a stored node, or a virtual slice of a
/// uniform ancestor.
#[derive(Clone, Copy)]
enum Cursor {
    Stored(u32),
    Uniform(Wad),
}

/// Per-market tree of bin weights supporting range multiply and range sum.
#[derive(Debug)]
pub struct RangeTree {
    nodes: Vec<Node>,
    bin_count: u32,
    flushes: u64,
    journal: Option<Journal>,
}

impl RangeTree {
    /// Builds a tree of `bin_count` bins, each at weight `Wad::ONE`.
    ///
    /// # Errors
    /// `InvalidBinCount` for zero bins or more than [`MAX_BIN_COUNT`].
    pub fn new(bin_count: u32) -> Result<Self> {
        if bin_count == 0 || bin_count > MAX_BIN_COUNT {
            return Err(ClmsrError::InvalidBinCount(bin_count));
        }
        let total = Wad::from_int(u64::from(bin_count));
        Ok(Self {
            nodes: vec![Node::uniform(total)],
            bin_count,
            flushes: 0,
            journal: None,
        })
    }

    pub const fn bin_count(&self) -> u32 {
        self.bin_count
    }

    /// Sum of every bin weight, O(1).
    pub fn total_sum(&self) -> Wad {
        self.nodes[ROOT as usize].sum
    }

    /// Number of allocated arena nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of underflow flushes performed so far.
    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Multiplies every bin in `[lower, upper]` by `factor`.
    ///
    /// # Errors
    /// `InvalidFactor`, `InvalidRange`, `IndexOutOfBounds`, or an arithmetic
    /// error. The tree is unchanged on failure.
    pub fn apply_range_factor(&mut self, lower: u32, upper: u32, factor: Wad) -> Result<()> {
        validate_factor(factor)?;
        self.validate_range(lower, upper)?;
        let last = self.bin_count - 1;
        self.atomically(|tree| tree.multiply(ROOT, 0, last, lower, upper, factor))
    }

    /// Overwrites the weight of a single bin.
    pub fn update(&mut self, index: u32, weight: Wad) -> Result<()> {
        self.validate_index(index)?;
        let last = self.bin_count - 1;
        self.atomically(|tree| tree.assign(ROOT, 0, last, index, weight))
    }

    /// Overwrites several bins in one atomic step. Later entries win on
    /// duplicate indices.
    pub fn batch_update(&mut self, updates: &[(u32, Wad)]) -> Result<()> {
        for &(index, _) in updates {
            self.validate_index(index)?;
        }
        let last = self.bin_count - 1;
        self.atomically(|tree| {
            for &(index, weight) in updates {
                tree.assign(ROOT, 0, last, index, weight)?;
            }
            Ok(())
        })
    }

    /// Sum of the bin weights in `[lower, upper]`.
    pub fn range_sum(&self, lower: u32, upper: u32) -> Result<Wad> {
        self.validate_range(lower, upper)?;
        self.query(Cursor::Stored(ROOT), 0, self.bin_count - 1, lower, upper)
    }

    /// Weight of a single bin.
    pub fn weight(&self, index: u32) -> Result<Wad> {
        self.range_sum(index, index)
    }

    /// Runs `op` as one all-or-nothing mutation.
    ///
    /// If `op` fails, every node it overwrote is restored and every node it
    /// allocated is released. Nested calls join the outermost operation.
    pub fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.journal.is_some() {
            return op(self);
        }
        self.journal = Some(Journal {
            arena_len: self.nodes.len(),
            entries: Vec::new(),
            flushes: self.flushes,
        });
        let outcome = op(self);
        let journal = self.journal.take();
        if outcome.is_err() {
            if let Some(journal) = journal {
                self.rollback(journal);
            }
        }
        outcome
    }

    // ────────────────────────────────────────────
    // Validation
    // ────────────────────────────────────────────

    fn validate_index(&self, index: u32) -> Result<()> {
        if index >= self.bin_count {
            return Err(ClmsrError::IndexOutOfBounds {
                index,
                bin_count: self.bin_count,
            });
        }
        Ok(())
    }

    fn validate_range(&self, lower: u32, upper: u32) -> Result<()> {
        if lower > upper {
            return Err(ClmsrError::InvalidRange { lower, upper });
        }
        self.validate_index(upper)
    }

    // ────────────────────────────────────────────
    // Arena and journal
    // ────────────────────────────────────────────

    fn node(&self, index: u32) -> Node {
        self.nodes[index as usize]
    }

    fn store(&mut self, index: u32, node: Node) {
        let slot = index as usize;
        if let Some(journal) = self.journal.as_mut() {
            if slot < journal.arena_len {
                journal.entries.push((index, self.nodes[slot]));
            }
        }
        self.nodes[slot] = node;
    }

    fn alloc(&mut self, node: Node) -> Result<u32> {
        let index = u32::try_from(self.nodes.len()).map_err(|_| ClmsrError::overflow("alloc"))?;
        self.nodes.push(node);
        Ok(index)
    }

    fn rollback(&mut self, journal: Journal) {
        for (index, node) in journal.entries.into_iter().rev() {
            self.nodes[index as usize] = node;
        }
        self.nodes.truncate(journal.arena_len);
        self.flushes = journal.flushes;
    }

    // ────────────────────────────────────────────
    // Mutation
    // ────────────────────────────────────────────

    fn multiply(
        &mut self,
        index: u32,
        l: u32,
        r: u32,
        lower: u32,
        upper: u32,
        factor: Wad,
    ) -> Result<()> {
        if lower <= l && r <= upper {
            return self.scale_node(index, l, r, factor);
        }
        self.push_down(index, l, r)?;
        let node = self.node(index);
        let mid = midpoint(l, r);
        if lower <= mid {
            self.multiply(node.left, l, mid, lower, upper, factor)?;
        }
        if upper > mid {
            self.multiply(node.right, mid + 1, r, lower, upper, factor)?;
        }
        self.pull_up(index)
    }

    fn assign(&mut self, index: u32, l: u32, r: u32, bin: u32, weight: Wad) -> Result<()> {
        if l == r {
            self.store(index, Node::uniform(weight));
            return Ok(());
        }
        self.push_down(index, l, r)?;
        let node = self.node(index);
        let mid = midpoint(l, r);
        if bin <= mid {
            self.assign(node.left, l, mid, bin, weight)?;
        } else {
            self.assign(node.right, mid + 1, r, bin, weight)?;
        }
        self.pull_up(index)
    }

    /// Scales a fully covered node, deferring the factor to its children.
    fn scale_node(&mut self, index: u32, l: u32, r: u32, factor: Wad) -> Result<()> {
        let node = self.node(index);
        let sum = node.sum.mul(factor, Rounding::Nearest)?;
        if !node.has_children() {
            self.store(index, Node { sum, ..node });
            return Ok(());
        }
        match compose_factors(node.pending, factor)? {
            Composition::Combined(pending) => {
                self.store(index, Node { sum, pending, ..node });
            }
            Composition::Flush(pending) => {
                debug!(node = index, l, r, stale = %node.pending, "flushing pending factor");
                self.push_down(index, l, r)?;
                let flushed = self.node(index);
                self.store(index, Node { sum, pending, ..flushed });
                self.flushes += 1;
            }
        }
        Ok(())
    }

    /// Makes both children of `index` concrete and current: allocates them
    /// for a uniform node, otherwise hands the pending factor down.
    fn push_down(&mut self, index: u32, l: u32, r: u32) -> Result<()> {
        let node = self.node(index);
        let mid = midpoint(l, r);
        if !node.has_children() {
            let (left_sum, right_sum) = split_uniform(node.sum, l, mid, r)?;
            let left = self.alloc(Node::uniform(left_sum))?;
            let right = self.alloc(Node::uniform(right_sum))?;
            self.store(index, Node { left, right, ..node });
            return Ok(());
        }
        if node.pending == Wad::ONE {
            return Ok(());
        }
        self.scale_node(node.left, l, mid, node.pending)?;
        self.scale_node(node.right, mid + 1, r, node.pending)?;
        self.store(
            index,
            Node {
                pending: Wad::ONE,
                ..node
            },
        );
        Ok(())
    }

    fn pull_up(&mut self, index: u32) -> Result<()> {
        let node = self.node(index);
        let sum = self
            .node(node.left)
            .sum
            .try_add(self.node(node.right).sum)?;
        self.store(index, Node { sum, ..node });
        Ok(())
    }

    // ────────────────────────────────────────────
    // Query
    // ────────────────────────────────────────────

    fn query(&self, cursor: Cursor, l: u32, r: u32, lower: u32, upper: u32) -> Result<Wad> {
        if upper < l || r < lower {
            return Ok(Wad::ZERO);
        }
        let (sum, node) = match cursor {
            Cursor::Stored(index) => {
                let node = self.node(index);
                (node.sum, node.has_children().then_some(node))
            }
            Cursor::Uniform(sum) => (sum, None),
        };
        if lower <= l && r <= upper {
            return Ok(sum);
        }

        let mid = midpoint(l, r);
        let Some(node) = node else {
            let (left_sum, right_sum) = split_uniform(sum, l, mid, r)?;
            let left = self.query(Cursor::Uniform(left_sum), l, mid, lower, upper)?;
            let right = self.query(Cursor::Uniform(right_sum), mid + 1, r, lower, upper)?;
            return left.try_add(right);
        };
        let left = self.query(Cursor::Stored(node.left), l, mid, lower, upper)?;
        let right = self.query(Cursor::Stored(node.right), mid + 1, r, lower, upper)?;
        let partial = left.try_add(right)?;
        if node.pending == Wad::ONE {
            Ok(partial)
        } else {
            partial.mul(node.pending, Rounding::Nearest)
        }
    }
}

const fn midpoint(l: u32, r: u32) -> u32 {
    l + (r - l) / 2
}

/// Splits a uniform subtree's sum in proportion to the sizes of its halves.
fn split_uniform(sum: Wad, l: u32, mid: u32, r: u32) -> Result<(Wad, Wad)> {
    let size = u128::from(r - l + 1);
    let left_size = u128::from(mid - l + 1);
    let left = sum.mul_div(left_size, size, Rounding::Down)?;
    Ok((left, sum.try_sub(left)?))
}
