//! Immutable render plan compiled from registered units and patch cords.
//!
//! The render thread never walks the patch graph. It executes a flat list of
//! `RenderNode`s in the order computed here, reading inputs by index into the
//! previous nodes' output buffers.

use crate::audio::unit::{AudioRole, SharedUnit};
use crate::patch::id::ObjectId;
use crate::patch::payload::SharedCell;
use std::collections::{BTreeMap, HashMap};

/// An audio link between two registered units. Port indices count audio
/// ports only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchCord {
    pub from: ObjectId,
    pub from_port: usize,
    pub to: ObjectId,
    pub to_port: usize,
}

/// What the bridge keeps per registered object.
#[derive(Clone)]
pub struct UnitEntry {
    pub unit: SharedUnit,
    pub role: AudioRole,
    pub inputs: usize,
    /// Outlet cells the rendered blocks are published to, one per audio outlet.
    pub cells: Vec<SharedCell>,
}

/// One unit in execution order.
pub struct RenderNode {
    pub object: ObjectId,
    pub unit: SharedUnit,
    /// Per audio inlet, the `(node index, output port)` pairs mixed into it.
    pub inputs: Vec<Vec<(usize, usize)>>,
    pub outputs: usize,
    pub cells: Vec<SharedCell>,
}

/// Snapshot of the render graph. Swapped wholesale, never mutated.
pub struct RenderPlan {
    pub epoch: u64,
    pub nodes: Vec<RenderNode>,
    /// Index of the hardware endpoint node, if one is registered.
    pub device: Option<usize>,
}

impl RenderPlan {
    pub fn empty(epoch: u64) -> Self {
        Self {
            epoch,
            nodes: Vec::new(),
            device: None,
        }
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.nodes.iter().any(|n| n.object == object)
    }

    /// Compile units and cords into execution order (Kahn's algorithm).
    ///
    /// Units caught in a cycle are appended in id order; their back-edge
    /// inputs read the previous block.
    pub fn compile(units: &BTreeMap<ObjectId, UnitEntry>, cords: &[PatchCord], epoch: u64) -> Self {
        let ids: Vec<ObjectId> = units.keys().copied().collect();
        let n = ids.len();
        let pos: HashMap<ObjectId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut in_degree = vec![0u32; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for cord in cords {
            if let (Some(&from), Some(&to)) = (pos.get(&cord.from), pos.get(&cord.to)) {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        // Ready set kept sorted descending so `pop` yields the lowest id first.
        let mut ready: Vec<usize> = (0..n).rev().filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut placed = vec![false; n];

        while let Some(node) = ready.pop() {
            order.push(node);
            placed[node] = true;
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                    ready.sort_unstable_by(|a, b| b.cmp(a));
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Audio graph has a cycle: {} of {} units ordered, the rest run one block late",
                order.len(),
                n
            );
            order.extend((0..n).filter(|&i| !placed[i]));
        }

        let mut slot_of = vec![0usize; n];
        for (slot, &i) in order.iter().enumerate() {
            slot_of[i] = slot;
        }

        let mut nodes: Vec<RenderNode> = order
            .iter()
            .map(|&i| {
                let entry = &units[&ids[i]];
                RenderNode {
                    object: ids[i],
                    unit: entry.unit.clone(),
                    inputs: vec![Vec::new(); entry.inputs],
                    outputs: entry.cells.len(),
                    cells: entry.cells.clone(),
                }
            })
            .collect();

        for cord in cords {
            let (Some(&from), Some(&to)) = (pos.get(&cord.from), pos.get(&cord.to)) else {
                continue;
            };
            let src = slot_of[from];
            let dst = slot_of[to];
            if cord.from_port >= nodes[src].outputs || cord.to_port >= nodes[dst].inputs.len() {
                tracing::warn!(
                    "Dropping cord {:?}:{} -> {:?}:{} with out-of-range port",
                    cord.from,
                    cord.from_port,
                    cord.to,
                    cord.to_port
                );
                continue;
            }
            nodes[dst].inputs[cord.to_port].push((src, cord.from_port));
        }

        let device = order
            .iter()
            .position(|&i| units[&ids[i]].role == AudioRole::Device);

        Self {
            epoch,
            nodes,
            device,
        }
    }
}
