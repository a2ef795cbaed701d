//! Target registry
//!
//! Owns the configured targets. Lookups are linear scans: the target list is
//! a handful of entries and configuration order decides ties.

use std::ops::{Index, IndexMut};

use super::target::Target;
use crate::audio::{AudioObject, ObjectKind};
use crate::config::TargetConfig;

/// Position of a target in configuration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub usize);

#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn from_config(configs: &[TargetConfig]) -> Self {
        Self::new(configs.iter().map(Target::from_config).collect())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = TargetId> {
        (0..self.targets.len()).map(TargetId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &Target)> {
        self.targets.iter().enumerate().map(|(i, t)| (TargetId(i), t))
    }

    /// Targets of a kind, in configuration order
    pub fn ids_of_kind(&self, kind: ObjectKind) -> Vec<TargetId> {
        self.iter()
            .filter(|(_, t)| t.kind() == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// First target configured for (kind, name)
    pub fn find_by_name(&self, kind: ObjectKind, name: &str) -> Option<TargetId> {
        self.iter()
            .find(|(_, t)| t.kind() == kind && t.match_name() == name)
            .map(|(id, _)| id)
    }

    /// Target currently bound to a live index of the given kind
    pub fn find_by_index(&self, kind: ObjectKind, index: u32) -> Option<TargetId> {
        self.iter()
            .find(|(_, t)| t.kind() == kind && t.owns(index))
            .map(|(id, _)| id)
    }

    /// Bind a live object to a target and take over its state
    ///
    /// The index is first released by any other target of the same kind, so
    /// an index is owned by at most one target. Returns the targets that lost
    /// the index.
    pub fn bind(&mut self, id: TargetId, object: &AudioObject) -> Vec<TargetId> {
        let kind = self.targets[id.0].kind();
        debug_assert_eq!(kind, object.kind());

        let mut released = Vec::new();
        for (i, other) in self.targets.iter_mut().enumerate() {
            if i != id.0 && other.kind() == kind && other.remove_live(object.index()) {
                released.push(TargetId(i));
            }
        }

        let target = &mut self.targets[id.0];
        target.insert_live(object.index(), object.name());
        target.absorb(object);

        released
    }

    /// Drop a live index from whichever target owns it
    pub fn unbind(&mut self, kind: ObjectKind, index: u32) -> Option<TargetId> {
        let id = self.find_by_index(kind, index)?;
        self.targets[id.0].remove_live(index);
        Some(id)
    }
}

impl Index<TargetId> for TargetRegistry {
    type Output = Target;

    fn index(&self, id: TargetId) -> &Target {
        &self.targets[id.0]
    }
}

impl IndexMut<TargetId> for TargetRegistry {
    fn index_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.targets[id.0]
    }
}
