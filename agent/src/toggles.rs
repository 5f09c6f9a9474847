//! Named overrides resolved against the subscription, tenant and region of a request.
use datamodel::{EnvironmentInfo, NodeBootstrappingConfiguration};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Who a toggle is evaluated for.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Entity {
    pub subscription_id: String,
    pub tenant_id: String,
    pub region: String,
}

impl Entity {
    pub fn from_nbc(nbc: &NodeBootstrappingConfiguration) -> Self {
        Self {
            subscription_id: nbc.subscription_id.clone(),
            tenant_id: nbc.tenant_id.clone(),
            region: nbc.container_service.location.clone(),
        }
    }

    pub fn from_environment_info(env: &EnvironmentInfo) -> Self {
        Self {
            subscription_id: env.subscription_id.clone(),
            tenant_id: env.tenant_id.clone(),
            region: env.region.clone(),
        }
    }
}

pub type MapToggle = Arc<dyn Fn(&Entity) -> BTreeMap<String, String> + Send + Sync>;
pub type StringToggle = Arc<dyn Fn(&Entity) -> String + Send + Sync>;

/// The toggles a builder was constructed with. Unknown toggles resolve to empty values.
#[derive(Clone, Default)]
pub struct Toggles {
    pub maps: HashMap<String, MapToggle>,
    pub strings: HashMap<String, StringToggle>,
}

impl Toggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map_toggle<F>(mut self, name: &str, toggle: F) -> Self
    where
        F: Fn(&Entity) -> BTreeMap<String, String> + Send + Sync + 'static,
    {
        self.maps.insert(name.to_string(), Arc::new(toggle));
        self
    }

    pub fn with_string_toggle<F>(mut self, name: &str, toggle: F) -> Self
    where
        F: Fn(&Entity) -> String + Send + Sync + 'static,
    {
        self.strings.insert(name.to_string(), Arc::new(toggle));
        self
    }

    pub fn get_map(&self, name: &str, entity: &Entity) -> BTreeMap<String, String> {
        self.maps
            .get(name)
            .map(|toggle| toggle(entity))
            .unwrap_or_default()
    }

    pub fn get_string(&self, name: &str, entity: &Entity) -> String {
        self.strings
            .get(name)
            .map(|toggle| toggle(entity))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Toggles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut maps: Vec<_> = self.maps.keys().collect();
        maps.sort();
        let mut strings: Vec<_> = self.strings.keys().collect();
        strings.sort();
        f.debug_struct("Toggles")
            .field("maps", &maps)
            .field("strings", &strings)
            .finish()
    }
}
