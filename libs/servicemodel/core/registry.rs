use crate::core::address::EndpointAddress;
use crate::core::config::ClientSection;
use crate::core::description::ServiceEndpoint;
use crate::traits::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Wildcard configuration name: the single endpoint configured for the contract
pub const ANY_ENDPOINT: &str = "*";

/// Named endpoint configurations for one channel type
///
/// Resolves the configuration names used by `EndpointTrait::Configuration`.
/// Built in code with `with_endpoint`, or from the `client.endpoints` section
/// of the config file plus a table of bindings by name.
pub struct EndpointRegistry<C> {
    endpoints: Vec<(String, Arc<ServiceEndpoint<C>>)>,
}

impl<C: ClientChannel> EndpointRegistry<C> {
    pub fn new() -> Self {
        Self { endpoints: Vec::new() }
    }

    /// Register a named endpoint for `C`'s contract
    pub fn register(&mut self, name: impl Into<String>, binding: Arc<dyn Binding<C>>, address: EndpointAddress) {
        let name = name.into();
        let endpoint = ServiceEndpoint::new(C::contract())
            .with_name(name.clone())
            .with_binding(binding)
            .with_address(address);
        self.register_endpoint(name, endpoint);
    }

    /// Register a fully built endpoint under `name`
    pub fn register_endpoint(&mut self, name: impl Into<String>, endpoint: ServiceEndpoint<C>) {
        let name = name.into();
        self.endpoints.retain(|(existing, _)| *existing != name);
        self.endpoints.push((name, Arc::new(endpoint)));
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, binding: Arc<dyn Binding<C>>, address: EndpointAddress) -> Self {
        self.register(name, binding, address);
        self
    }

    /// Build from the `client` config section
    ///
    /// Entries whose contract is not `C`'s are skipped.
    ///
    /// # Arguments
    /// * `section` - Parsed `client` section
    /// * `bindings` - Binding instances by the names used in the config file
    ///
    /// # Returns
    /// * `Err(ServiceModelError::Configuration)` - An entry names an unknown binding or an invalid address
    pub fn from_section(section: &ClientSection, bindings: &HashMap<String, Arc<dyn Binding<C>>>) -> Result<Self> {
        let contract = C::contract();
        let mut registry = Self::new();

        for entry in &section.endpoints {
            if entry.contract != contract.name() {
                continue;
            }
            let binding = bindings.get(&entry.binding).ok_or_else(|| {
                ServiceModelError::Configuration(format!(
                    "Endpoint '{}' uses unknown binding '{}'",
                    entry.name, entry.binding
                ))
            })?;
            let address = EndpointAddress::parse(&entry.address)?;
            registry.register(entry.name.clone(), Arc::clone(binding), address);
            debug!("Registered endpoint '{}' for {}", entry.name, contract.name());
        }

        Ok(registry)
    }

    /// Find the endpoint configured under `name`
    ///
    /// `"*"` matches when exactly one endpoint is registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<ServiceEndpoint<C>>> {
        if name == ANY_ENDPOINT {
            return match self.endpoints.as_slice() {
                [(_, endpoint)] => Ok(Arc::clone(endpoint)),
                [] => Err(ServiceModelError::Configuration(format!(
                    "No endpoint configured for contract '{}'",
                    C::contract().name()
                ))),
                _ => Err(ServiceModelError::Configuration(format!(
                    "More than one endpoint configured for contract '{}'; use a name instead of '*'",
                    C::contract().name()
                ))),
            };
        }

        self.endpoints
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, endpoint)| Arc::clone(endpoint))
            .ok_or_else(|| {
                ServiceModelError::Configuration(format!(
                    "No endpoint named '{}' for contract '{}'",
                    name,
                    C::contract().name()
                ))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl<C> std::fmt::Debug for EndpointRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.endpoints.iter().map(|(name, endpoint)| (name, endpoint)))
            .finish()
    }
}

impl<C: ClientChannel> Default for EndpointRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
