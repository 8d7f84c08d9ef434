// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// ConsensusLayoutTree: a forest of tries over reads sharing a coordinate frame, from which
// consensus layouts are extracted.
//
// Nodes live in an arena and are addressed by NodeId.  A node's coordinate is relative to the
// tree's aligned position, which is the largest aligned position of any read seen so far, so
// base i of read r sits at coordinate aligned_pos - r.aligned_pos + i.  Every live node is
// registered under its coordinate, so a read may enter a branch at any depth.
//
// Bookkeeping per node:
// count    = reads whose path passes through the node
// hq_count = those of them having a high quality base there
// entries  = reads whose path starts at the node
// reads    = reads whose path ends at the node, with their entry node.
// Hence count(x) = |reads(x)| + sum over children c of (count(c) - entries(c)).
//
// Sealing.  After each insertion the nodes on the read's path are examined.  A node whose top
// child's support exceeds the seal factor and is at least the seal factor times the support
// of the runner-up is sealed: all other children are pruned, together with their subtrees,
// and the reads ending in the pruned subtrees are queued.  A node with a single child is
// never sealed.  A sealed node never gets a new child.  Once all reads have been seen, the queued reads are inserted again, relaxing the
// seal factor each round; whatever is still queued after the last round is inserted with
// sealing off.

use crate::error::{JunctionError, Result};
use crate::heuristics::Heuristics;
use crate::layout::ConsensusLayout;
use crate::read::{is_resolved, Read};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

pub type NodeId = usize;

const UNRESOLVED: u8 = b'N';

#[derive(Debug)]
struct Node {
    pos: i32,
    base: u8, // UNRESOLVED until a high quality base sets it, then fixed
    hq_count: u32,
    count: u32,
    entries: u32,
    reads: Vec<(Read, NodeId)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    sealed: bool,
    alive: bool,
}

pub struct ConsensusLayoutTree {
    heur: Heuristics,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    by_pos: HashMap<i32, Vec<NodeId>>,
    aligned_pos: Option<i32>,
    pending: Vec<Read>,
}

// A seal decision: seal node, keeping child keep.

struct Seal {
    node: NodeId,
    keep: NodeId,
}

impl ConsensusLayoutTree {
    pub fn new(heur: &Heuristics) -> ConsensusLayoutTree {
        ConsensusLayoutTree {
            heur: heur.clone(),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_pos: HashMap::new(),
            aligned_pos: None,
            pending: Vec::new(),
        }
    }

    /// Build all layouts of a batch of reads, presented in the given order.
    pub fn layouts_of(reads: &[Read], heur: &Heuristics) -> Result<Vec<ConsensusLayout>> {
        let mut tree = ConsensusLayoutTree::new(heur);
        for r in reads {
            tree.add_read(r)?;
        }
        tree.finish()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// First pass insertion.  Empty reads are ignored.
    pub fn add_read(&mut self, read: &Read) -> Result<()> {
        let factor = self.heur.seal_factor_for_round(0);
        self.insert(read, Some(factor))
    }

    // Reinsert queued reads, then extract layouts.

    pub fn finish(mut self) -> Result<Vec<ConsensusLayout>> {
        for round in 1..=self.heur.max_reassign_rounds {
            if self.pending.is_empty() {
                break;
            }
            let factor = self.heur.seal_factor_for_round(round);
            let queued = std::mem::take(&mut self.pending);
            debug!(
                "reassignment round {}: {} reads, seal factor {:.3}",
                round,
                queued.len(),
                factor
            );
            for r in queued.iter() {
                self.insert(r, Some(factor))?;
            }
        }
        let queued = std::mem::take(&mut self.pending);
        if !queued.is_empty() {
            debug!("placing {} reads with sealing off", queued.len());
        }
        for r in queued.iter() {
            self.insert(r, None)?;
        }
        Ok(self.extract())
    }

    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
    // INSERTION
    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

    fn support(&self, id: NodeId) -> f64 {
        let n = &self.nodes[id];
        n.hq_count as f64 + self.heur.low_quality_weight * (n.count - n.hq_count) as f64
    }

    fn hq_resolved(&self, read: &Read, i: usize) -> bool {
        self.heur.is_high_quality(read.qual[i]) && is_resolved(read.seq[i])
    }

    // Highest support node of a list, ties to the lowest id.

    fn best_by_support(&self, ids: &[NodeId]) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        for &id in ids {
            best = match best {
                Some(b)
                    if self.support(b) > self.support(id)
                        || (self.support(b) == self.support(id) && b < id) =>
                {
                    Some(b)
                }
                _ => Some(id),
            };
        }
        best
    }

    // The child a read base continues into: an exact match, else for a low quality base the
    // best supported child, else an unresolved child.

    fn choose_child(&self, node: NodeId, base: u8, hq: bool) -> Option<NodeId> {
        let children = &self.nodes[node].children;
        if is_resolved(base) {
            if let Some(&c) = children.iter().find(|&&c| self.nodes[c].base == base) {
                return Some(c);
            }
        }
        if !hq {
            return self.best_by_support(children);
        }
        children
            .iter()
            .find(|&&c| self.nodes[c].base == UNRESOLVED)
            .cloned()
    }

    // Could the read enter the tree at this node?

    fn overlaps(&self, node: NodeId, read: &Read) -> bool {
        let b = self.nodes[node].base;
        if self.hq_resolved(read, 0) && b != UNRESOLVED && b != read.seq[0] {
            return false;
        }
        let mut cur = node;
        for i in 1..read.len() {
            match self.choose_child(cur, read.seq[i], self.hq_resolved(read, i)) {
                Some(c) => cur = c,
                None => return i >= self.heur.tree_min_overlap && !self.nodes[cur].sealed,
            }
        }
        true
    }

    fn new_node(&mut self, pos: i32, base: u8, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            pos,
            base,
            hq_count: 0,
            count: 0,
            entries: 0,
            reads: Vec::new(),
            children: Vec::new(),
            parent,
            sealed: false,
            alive: true,
        });
        self.by_pos.entry(pos).or_default().push(id);
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    // Move the frame so that a read with a larger aligned position fits.

    fn shift_frame(&mut self, new_aligned_pos: i32) {
        let old = self.aligned_pos.unwrap_or(new_aligned_pos);
        let d = new_aligned_pos - old;
        if d > 0 {
            warn!(
                "read out of order: aligned position {} exceeds {}, shifting tree by {}",
                new_aligned_pos, old, d
            );
            for n in self.nodes.iter_mut() {
                n.pos += d;
            }
            self.by_pos = self
                .by_pos
                .drain()
                .map(|(pos, ids)| (pos + d, ids))
                .collect();
        }
        self.aligned_pos = Some(new_aligned_pos);
    }

    fn visit(&mut self, id: NodeId, read: &Read, i: usize) {
        let hq = self.hq_resolved(read, i);
        let n = &mut self.nodes[id];
        if hq && n.base == UNRESOLVED {
            n.base = read.seq[i];
        }
        n.count += 1;
        if hq {
            n.hq_count += 1;
        }
    }

    fn insert(&mut self, read: &Read, seal_factor: Option<f64>) -> Result<()> {
        if read.is_empty() {
            return Ok(());
        }
        if self.aligned_pos.map_or(true, |p| read.aligned_pos > p) {
            self.shift_frame(read.aligned_pos);
        }
        let start = self.aligned_pos.unwrap_or(read.aligned_pos) - read.aligned_pos;

        let candidates: Vec<NodeId> = self
            .by_pos
            .get(&start)
            .map(|ids| ids.iter().cloned().filter(|&id| self.overlaps(id, read)).collect())
            .unwrap_or_default();
        let entry = match self.best_by_support(&candidates) {
            Some(id) => id,
            None => {
                let base = if self.hq_resolved(read, 0) {
                    read.seq[0]
                } else {
                    UNRESOLVED
                };
                self.new_node(start, base, None)
            }
        };

        let mut path = vec![entry];
        self.visit(entry, read, 0);
        self.nodes[entry].entries += 1;
        let mut cur = entry;
        for i in 1..read.len() {
            let hq = self.hq_resolved(read, i);
            cur = match self.choose_child(cur, read.seq[i], hq) {
                Some(c) => c,
                None => {
                    let base = if hq { read.seq[i] } else { UNRESOLVED };
                    self.new_node(start + i as i32, base, Some(cur))
                }
            };
            self.visit(cur, read, i);
            path.push(cur);
        }
        self.nodes[cur].reads.push((read.clone(), entry));

        if let Some(factor) = seal_factor {
            let seals = self.find_seals(&path, factor);
            for s in seals {
                self.apply_seal(&s)?;
            }
        }
        Ok(())
    }

    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
    // SEALING
    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

    fn find_seals(&self, path: &[NodeId], factor: f64) -> Vec<Seal> {
        let mut seals = Vec::new();
        for &id in path {
            let n = &self.nodes[id];
            if n.sealed || n.children.len() < 2 {
                continue;
            }
            let top = match self.best_by_support(&n.children) {
                Some(t) => t,
                None => continue,
            };
            let runner_up = n
                .children
                .iter()
                .filter(|&&c| c != top)
                .map(|&c| self.support(c))
                .fold(0.0, f64::max);
            let s = self.support(top);
            if s > factor && s >= factor * runner_up {
                seals.push(Seal { node: id, keep: top });
            }
        }
        seals
    }

    fn apply_seal(&mut self, seal: &Seal) -> Result<()> {
        if !self.nodes[seal.node].alive {
            return Ok(());
        }
        self.nodes[seal.node].sealed = true;
        let pruned_children: Vec<NodeId> = self.nodes[seal.node]
            .children
            .iter()
            .cloned()
            .filter(|&c| c != seal.keep)
            .collect();
        if pruned_children.is_empty() {
            return Ok(());
        }

        // Collect the pruned subtrees.
        let mut pruned = Vec::<NodeId>::new();
        let mut stack = pruned_children.clone();
        while let Some(id) = stack.pop() {
            pruned.push(id);
            stack.extend(self.nodes[id].children.iter().cloned());
        }
        let pruned_set: HashSet<NodeId> = pruned.iter().cloned().collect();

        // Retract reads that entered above the pruned subtrees.
        let mut queued = Vec::<Read>::new();
        for &id in pruned.iter() {
            let reads = std::mem::take(&mut self.nodes[id].reads);
            for (r, entry) in reads {
                if !pruned_set.contains(&entry) {
                    self.retract(&r, seal.node, entry)?;
                }
                queued.push(r);
            }
        }
        for &id in pruned.iter() {
            let pos = self.nodes[id].pos;
            self.nodes[id].alive = false;
            self.nodes[id].children.clear();
            if let Some(ids) = self.by_pos.get_mut(&pos) {
                ids.retain(|&x| x != id);
                if ids.is_empty() {
                    self.by_pos.remove(&pos);
                }
            }
        }
        self.nodes[seal.node].children = vec![seal.keep];
        debug!(
            "sealed node at {}: pruned {} nodes, queued {} reads",
            self.nodes[seal.node].pos,
            pruned.len(),
            queued.len()
        );
        self.pending.extend(queued);
        self.check_upward(seal.node)
    }

    // Undo a read's counts from node up to and including its entry node.

    fn retract(&mut self, read: &Read, from: NodeId, entry: NodeId) -> Result<()> {
        let start = self.aligned_pos.unwrap_or(read.aligned_pos) - read.aligned_pos;
        let mut cur = Some(from);
        while let Some(id) = cur {
            let i = (self.nodes[id].pos - start) as usize;
            let hq = self.hq_resolved(read, i);
            let n = &mut self.nodes[id];
            n.count = n.count.checked_sub(1).ok_or_else(|| {
                JunctionError::TreeInconsistency(format!("negative count at node {}", id))
            })?;
            if hq {
                n.hq_count = n.hq_count.checked_sub(1).ok_or_else(|| {
                    JunctionError::TreeInconsistency(format!(
                        "negative high quality count at node {}",
                        id
                    ))
                })?;
            }
            if id == entry {
                n.entries = n.entries.checked_sub(1).ok_or_else(|| {
                    JunctionError::TreeInconsistency(format!("negative entries at node {}", id))
                })?;
                return Ok(());
            }
            cur = n.parent;
        }
        Err(JunctionError::TreeInconsistency(format!(
            "entry node {} of read {} is not above node {}",
            entry, read.key, from
        )))
    }

    fn check_upward(&self, from: NodeId) -> Result<()> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            let n = &self.nodes[id];
            let mut expected = n.reads.len() as u32;
            for &c in n.children.iter() {
                let cn = &self.nodes[c];
                if !cn.alive || cn.entries > cn.count || cn.hq_count > cn.count {
                    return Err(JunctionError::TreeInconsistency(format!(
                        "bad child {} of node {}",
                        c, id
                    )));
                }
                expected += cn.count - cn.entries;
            }
            if n.count != expected || n.hq_count > n.count {
                return Err(JunctionError::TreeInconsistency(format!(
                    "node {} has count {} but its reads and children account for {}",
                    id, n.count, expected
                )));
            }
            cur = n.parent;
        }
        Ok(())
    }

    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
    // EXTRACTION
    // ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

    fn by_descending_support(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut v: Vec<(f64, NodeId)> = ids.iter().map(|&id| (self.support(id), id)).collect();
        v.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        v.into_iter().map(|x| x.1).collect()
    }

    // One layout per leaf, in depth first order with better supported branches first.  Each
    // leaf takes the reads of the nodes above it not already taken by an earlier leaf.

    fn extract(&self) -> Vec<ConsensusLayout> {
        let mut leaves = Vec::<NodeId>::new();
        let mut stack: Vec<NodeId> = self.by_descending_support(&self.roots);
        stack.retain(|&id| self.nodes[id].alive);
        stack.reverse();
        while let Some(id) = stack.pop() {
            let children = &self.nodes[id].children;
            if children.is_empty() {
                leaves.push(id);
            } else {
                let mut sorted = self.by_descending_support(children);
                sorted.reverse();
                stack.extend(sorted);
            }
        }

        let mut claimed = vec![false; self.nodes.len()];
        let mut layouts = Vec::new();
        for leaf in leaves {
            let mut reads = Vec::<Read>::new();
            let mut cur = Some(leaf);
            while let Some(id) = cur {
                if claimed[id] {
                    break;
                }
                claimed[id] = true;
                reads.extend(self.nodes[id].reads.iter().map(|x| x.0.clone()));
                cur = self.nodes[id].parent;
            }
            if reads.is_empty() {
                continue;
            }
            reads.reverse();
            layouts.push(ConsensusLayout::from_reads(&reads, &self.heur));
        }
        layouts
    }
}
