//! Connection manager: validated link creation and removal.
//!
//! Refused connections leave the graph exactly as it was. Successful ones
//! alias the inlet, add a patch cord when both ends are audio units, and run
//! the special-connection pass so the destination can recognize its peer.

use crate::audio::bridge::AudioBridge;
use crate::audio::plan::PatchCord;
use crate::error::{PatchError, Result};
use crate::patch::graph::{Link, PatchGraph};
use crate::patch::id::{LinkId, ObjectId};
use crate::patch::port::PayloadKind;
use crate::patch::registry::ObjectRegistry;

/// Position of port `index` among the audio ports of the same direction.
pub(crate) fn audio_port_index(kinds: impl Iterator<Item = PayloadKind>, index: usize) -> usize {
    kinds
        .take(index)
        .filter(|k| *k == PayloadKind::Audio)
        .count()
}

pub struct Connections<'a> {
    pub graph: &'a mut PatchGraph,
    pub audio: &'a mut AudioBridge,
    pub registry: &'a ObjectRegistry,
}

impl Connections<'_> {
    pub fn connect(
        &mut self,
        from: ObjectId,
        from_outlet: usize,
        to: ObjectId,
        to_inlet: usize,
        kind: PayloadKind,
    ) -> Result<LinkId> {
        let source = self
            .graph
            .get(from)
            .filter(|s| s.state.accepts_links())
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("object {} is not live", from)))?;
        let outlet = source.outlets().get(from_outlet).ok_or_else(|| {
            PatchError::InvalidEndpoint(format!("{} has no outlet {}", from, from_outlet))
        })?;
        let outlet_kind = outlet.kind();

        let target = self
            .graph
            .get(to)
            .filter(|s| s.state.accepts_links())
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("object {} is not live", to)))?;
        let inlet = target.inlets().get(to_inlet).ok_or_else(|| {
            PatchError::InvalidEndpoint(format!("{} has no inlet {}", to, to_inlet))
        })?;
        let inlet_kind = inlet.kind();

        if outlet_kind != kind || inlet_kind != kind {
            return Err(PatchError::TypeMismatch {
                outlet: outlet_kind,
                inlet: inlet_kind,
                requested: kind,
            });
        }

        if let Some(existing) = self.graph.incoming(to, to_inlet) {
            return Err(PatchError::AlreadyConnected {
                object: to,
                inlet: to_inlet,
                existing: existing.id,
            });
        }

        let from_type = source.type_name.clone();
        let to_type = target.type_name.clone();
        let cord = (kind == PayloadKind::Audio
            && self.audio.is_registered(from)
            && self.audio.is_registered(to))
        .then(|| PatchCord {
            from,
            from_port: audio_port_index(source.outlets().iter().map(|o| o.kind()), from_outlet),
            to,
            to_port: audio_port_index(target.inlets().iter().map(|i| i.kind()), to_inlet),
        });

        let link = self.graph.insert_link(from, from_outlet, to, to_inlet, kind);
        tracing::info!(
            "Linked {}:{} -> {}:{} ({}) as {}",
            from,
            from_outlet,
            to,
            to_inlet,
            kind,
            link
        );

        if let Some(cord) = cord {
            self.audio.add_cord(link, cord);
        }

        if self.registry.is_special_connection(&from_type, &to_type) {
            tracing::debug!("Special connection '{}' -> '{}'", from_type, to_type);
            if let Some(object) = self.graph.get_mut(to).and_then(|s| s.object_mut()) {
                object.on_special_connection(&from_type, to_inlet);
            }
        }

        Ok(link)
    }

    pub fn disconnect(&mut self, link: LinkId) -> Result<Link> {
        let removed = self
            .graph
            .remove_link(link)
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("{} does not exist", link)))?;
        self.audio.remove_cord(link);
        tracing::info!(
            "Unlinked {}:{} -> {}:{} ({})",
            removed.from,
            removed.from_outlet,
            removed.to,
            removed.to_inlet,
            link
        );
        Ok(removed)
    }

    /// Remove every link touching `id`.
    pub fn sever(&mut self, id: ObjectId) -> Vec<Link> {
        self.graph
            .links_touching(id)
            .into_iter()
            .filter_map(|link| self.disconnect(link).ok())
            .collect()
    }
}
