use fnv::FnvHashMap;

use crate::error::{Error, Result};
use crate::types::{EntityId, ExternalId};

/// Bijective mapping between the internal ids used during computation and the external long
/// ids of the raw data. Built once, read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct IdIndex {
    to_external: FnvHashMap<EntityId, ExternalId>,
    to_internal: FnvHashMap<ExternalId, EntityId>,
}

impl IdIndex {

    pub fn from_pairs<I>(pairs: I) -> Result<Self>
        where I: IntoIterator<Item=(EntityId, ExternalId)> {

        let mut to_external: FnvHashMap<EntityId, ExternalId> = FnvHashMap::default();
        let mut to_internal: FnvHashMap<ExternalId, EntityId> = FnvHashMap::default();

        for (internal, external) in pairs {
            // Re-stating an existing pair is harmless, anything else breaks the bijection
            match (to_external.get(&internal), to_internal.get(&external)) {
                (None, None) => {
                    to_external.insert(internal, external);
                    to_internal.insert(external, internal);
                },
                (Some(known), Some(_)) if *known == external => {},
                _ => return Err(Error::IndexConflict { internal, external }),
            }
        }

        Ok(IdIndex { to_external, to_internal })
    }

    pub fn len(&self) -> usize {
        self.to_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_external.is_empty()
    }

    pub fn external(&self, internal: EntityId) -> Option<ExternalId> {
        self.to_external.get(&internal).cloned()
    }

    pub fn internal(&self, external: ExternalId) -> Option<EntityId> {
        self.to_internal.get(&external).cloned()
    }

    /// Keeps only the ids for which `keep` holds, used to cut a user index down to one block.
    pub fn retain<F>(&self, keep: F) -> IdIndex
        where F: Fn(EntityId) -> bool {

        let pairs = self.to_external.iter()
            .filter(|&(internal, _)| keep(*internal))
            .map(|(internal, external)| (*internal, *external));

        let mut index = IdIndex::default();
        for (internal, external) in pairs {
            index.to_external.insert(internal, external);
            index.to_internal.insert(external, internal);
        }
        index
    }
}

/// Translation of internal ids to the ids that are written out.
#[derive(Clone, Copy, Debug)]
pub enum IdTranslation<'a> {
    Identity,
    Indexed(&'a IdIndex),
}

impl<'a> IdTranslation<'a> {

    pub fn new(index: Option<&'a IdIndex>) -> Self {
        match index {
            Some(index) => IdTranslation::Indexed(index),
            None => IdTranslation::Identity,
        }
    }

    pub fn translate(&self, internal: EntityId) -> Result<ExternalId> {
        match *self {
            IdTranslation::Identity => Ok(ExternalId::from(internal)),
            IdTranslation::Indexed(index) => index.external(internal).ok_or(Error::UnknownId(internal)),
        }
    }
}
