//! Patch graph store: live objects keyed by id plus the link table.
//!
//! The store is the single source of truth for topology. It knows how to
//! alias and un-alias inlet cells when a link is inserted or removed, but it
//! does not validate anything; that is the connection manager's job.

use crate::patch::id::{LinkId, ObjectId};
use crate::patch::object::ObjectSlot;
use crate::patch::port::PayloadKind;
use std::collections::BTreeMap;

/// A typed link from one object's outlet to another object's inlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub from: ObjectId,
    pub from_outlet: usize,
    pub to: ObjectId,
    pub to_inlet: usize,
    pub kind: PayloadKind,
}

impl Link {
    pub fn touches(&self, id: ObjectId) -> bool {
        self.from == id || self.to == id
    }
}

#[derive(Default)]
pub struct PatchGraph {
    objects: BTreeMap<ObjectId, ObjectSlot>,
    links: Vec<Link>,
    next_link: u32,
}

impl PatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn insert(&mut self, slot: ObjectSlot) {
        self.objects.insert(slot.id, slot);
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectSlot> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectSlot> {
        self.objects.get_mut(&id)
    }

    /// Live ids in creation order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectSlot> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ObjectSlot> {
        self.objects.values_mut()
    }

    pub fn count_of_type(&self, type_name: &str) -> usize {
        self.objects
            .values()
            .filter(|s| s.type_name == type_name)
            .count()
    }

    /// Detach a slot from the store. Links must already be gone.
    pub(crate) fn take(&mut self, id: ObjectId) -> Option<ObjectSlot> {
        debug_assert!(!self.links.iter().any(|l| l.touches(id)));
        self.objects.remove(&id)
    }

    // ── Links ──

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    /// The link feeding `inlet` of `to`, if any.
    pub fn incoming(&self, to: ObjectId, inlet: usize) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.to == to && l.to_inlet == inlet)
    }

    pub fn outgoing(&self, from: ObjectId) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.from == from)
    }

    pub fn links_touching(&self, id: ObjectId) -> Vec<LinkId> {
        self.links
            .iter()
            .filter(|l| l.touches(id))
            .map(|l| l.id)
            .collect()
    }

    /// Record a link and alias the inlet to the outlet cell. Endpoints must
    /// have been validated.
    pub(crate) fn insert_link(
        &mut self,
        from: ObjectId,
        from_outlet: usize,
        to: ObjectId,
        to_inlet: usize,
        kind: PayloadKind,
    ) -> LinkId {
        let cell = self.objects[&from].outlets()[from_outlet].cell().clone();
        if let Some(slot) = self.objects.get_mut(&to) {
            slot.inlets_mut()[to_inlet].alias(&cell);
        }
        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.links.push(Link {
            id,
            from,
            from_outlet,
            to,
            to_inlet,
            kind,
        });
        id
    }

    /// Drop a link and restore the inlet's private cell.
    pub(crate) fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let pos = self.links.iter().position(|l| l.id == id)?;
        let link = self.links.remove(pos);
        if let Some(inlet) = self
            .objects
            .get_mut(&link.to)
            .and_then(|s| s.inlets_mut().get_mut(link.to_inlet))
        {
            inlet.unalias();
        }
        Some(link)
    }

    /// Re-point every inlet fed by `from` at its current outlet cell.
    pub(crate) fn realias_from(&mut self, from: ObjectId) -> usize {
        let targets: Vec<(ObjectId, usize, usize)> = self
            .outgoing(from)
            .map(|l| (l.to, l.to_inlet, l.from_outlet))
            .collect();
        for &(to, inlet, outlet) in &targets {
            let Some(cell) = self
                .objects
                .get(&from)
                .and_then(|s| s.outlets().get(outlet))
                .map(|o| o.cell().clone())
            else {
                continue;
            };
            if let Some(target) = self
                .objects
                .get_mut(&to)
                .and_then(|s| s.inlets_mut().get_mut(inlet))
            {
                target.alias(&cell);
            }
        }
        targets.len()
    }
}

/// Read-only view of the graph handed to an object during its update.
#[derive(Clone, Copy)]
pub struct PeerView<'a> {
    graph: &'a PatchGraph,
    me: ObjectId,
}

impl<'a> PeerView<'a> {
    pub(crate) fn new(graph: &'a PatchGraph, me: ObjectId) -> Self {
        Self { graph, me }
    }

    pub fn get(&self, id: ObjectId) -> Option<&'a ObjectSlot> {
        self.graph.get(id)
    }

    pub fn type_name(&self, id: ObjectId) -> Option<&'a str> {
        self.graph.get(id).map(|s| s.type_name.as_str())
    }

    pub fn links(&self) -> &'a [Link] {
        self.graph.links()
    }

    /// Every live object other than the one being updated.
    pub fn others(&self) -> impl Iterator<Item = &'a ObjectSlot> + 'a {
        let me = self.me;
        self.graph.iter().filter(move |s| s.id != me)
    }

    /// Producer `(object, outlet)` feeding one of my inlets.
    pub fn source_of(&self, inlet: usize) -> Option<(ObjectId, usize)> {
        self.graph
            .incoming(self.me, inlet)
            .map(|l| (l.from, l.from_outlet))
    }

    pub fn source_type(&self, inlet: usize) -> Option<&'a str> {
        let (from, _) = self.source_of(inlet)?;
        self.type_name(from)
    }
}
