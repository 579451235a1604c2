// ============================================================================
// Relation Maps
// ============================================================================
//
// The relation map of an object is the reference other rows store to point
// at it. It is assembled from an ordered list of contributors, base first;
// a later contributor may overwrite what an earlier one wrote.
//
// ============================================================================

use super::object::PersistentObject;
use crate::codec::{Binding, ForeignKey};
use crate::core::Result;
use std::collections::BTreeMap;

/// One layer of a relation map.
pub trait RelationContributor: Send + Sync {
    fn contribute(&self, object: &PersistentObject, reference: &mut ForeignKey) -> Result<()>;
}

/// Type name and primary key; every type starts with this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseContributor;

impl RelationContributor for BaseContributor {
    fn contribute(&self, object: &PersistentObject, reference: &mut ForeignKey) -> Result<()> {
        reference.type_name = object.type_name().to_string();
        reference.key = object.key()?;
        Ok(())
    }
}

/// Stack coordinates of a bound type.
#[derive(Debug, Clone)]
pub struct BindingContributor {
    binding: Binding,
}

impl BindingContributor {
    pub fn new(binding: Binding) -> Self {
        Self { binding }
    }
}

impl RelationContributor for BindingContributor {
    fn contribute(&self, _object: &PersistentObject, reference: &mut ForeignKey) -> Result<()> {
        reference.binding = Some(self.binding.clone());
        Ok(())
    }
}

pub fn build_relation_map(
    contributors: &[std::sync::Arc<dyn RelationContributor>],
    object: &PersistentObject,
) -> Result<ForeignKey> {
    let mut reference = ForeignKey::new(String::new(), BTreeMap::new());
    for contributor in contributors {
        contributor.contribute(object, &mut reference)?;
    }
    Ok(reference)
}
