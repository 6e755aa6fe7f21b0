use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Surface properties of a single body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub friction: f32,
    pub restitution: f32,
}

impl Material {
    pub fn new(id: u32, friction: f32, restitution: f32) -> Self {
        Material {
            id: MaterialId(id),
            friction,
            restitution,
        }
    }
}

/// Interaction parameters used when two materials touch.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub contact_stiffness: f32,
    /// Number of time steps needed to stabilize a contact.
    pub contact_relaxation: f32,
    pub friction_stiffness: f32,
    pub friction_relaxation: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        ContactMaterial {
            friction: 0.3,
            restitution: 0.3,
            contact_stiffness: 1e7,
            contact_relaxation: 3.0,
            friction_stiffness: 1e7,
            friction_relaxation: 3.0,
        }
    }
}

fn pair_key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

/// Contact materials keyed by unordered material pair.
#[derive(Clone, Debug, Default)]
pub struct ContactMaterialTable {
    entries: FxHashMap<(MaterialId, MaterialId), ContactMaterial>,
}

impl ContactMaterialTable {
    pub fn insert(&mut self, a: MaterialId, b: MaterialId, contact: ContactMaterial) {
        self.entries.insert(pair_key(a, b), contact);
    }

    pub fn remove(&mut self, a: MaterialId, b: MaterialId) -> Option<ContactMaterial> {
        self.entries.remove(&pair_key(a, b))
    }

    pub fn get(&self, a: MaterialId, b: MaterialId) -> Option<&ContactMaterial> {
        self.entries.get(&pair_key(a, b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the parameters for a body pair: an explicit entry for the two materials wins,
    /// then the product of both materials' values, then `default`.
    pub fn resolve(
        &self,
        a: Option<&Material>,
        b: Option<&Material>,
        default: &ContactMaterial,
    ) -> ContactMaterial {
        match (a, b) {
            (Some(a), Some(b)) => match self.get(a.id, b.id) {
                Some(contact) => *contact,
                None => ContactMaterial {
                    friction: a.friction * b.friction,
                    restitution: a.restitution * b.restitution,
                    ..*default
                },
            },
            _ => *default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_order() {
        let ice = Material::new(1, 0.1, 0.2);
        let rubber = Material::new(2, 0.9, 0.5);
        let default = ContactMaterial::default();
        let mut table = ContactMaterialTable::default();

        let mixed = table.resolve(Some(&ice), Some(&rubber), &default);
        assert!((mixed.friction - 0.09).abs() < 1e-6);
        assert!((mixed.restitution - 0.1).abs() < 1e-6);
        assert_eq!(mixed.contact_stiffness, default.contact_stiffness);

        let explicit = ContactMaterial {
            friction: 0.7,
            ..Default::default()
        };
        table.insert(rubber.id, ice.id, explicit);
        assert_eq!(table.resolve(Some(&ice), Some(&rubber), &default), explicit);
        assert_eq!(table.resolve(None, Some(&rubber), &default), default);
        assert!(table.remove(ice.id, rubber.id).is_some());
        assert!(table.is_empty());
    }
}
