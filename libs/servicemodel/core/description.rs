use crate::core::address::EndpointAddress;
use crate::traits::*;
use std::fmt;
use std::sync::Arc;

/// Namespace used when a contract does not declare one
pub const DEFAULT_NAMESPACE: &str = "http://tempuri.org/";

/// Whether a contract requires a session-capable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Allowed,
    Required,
    NotAllowed,
}

/// One operation of a service contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescription {
    pub name: String,
    pub action: String,
    pub is_one_way: bool,
}

/// Service contract metadata for a channel type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescription {
    name: String,
    namespace: String,
    session_mode: SessionMode,
    callback_contract: Option<String>,
    operations: Vec<OperationDescription>,
}

impl ContractDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            session_mode: SessionMode::default(),
            callback_contract: None,
            operations: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_session_mode(mut self, mode: SessionMode) -> Self {
        self.session_mode = mode;
        self
    }

    /// Declare a callback contract; channels for this contract need a
    /// callback instance (duplex)
    pub fn with_callback_contract(mut self, name: impl Into<String>) -> Self {
        self.callback_contract = Some(name.into());
        self
    }

    /// Add a request/reply operation; the action defaults to `namespace/contract/name`
    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let action = format!(
            "{}/{}/{}",
            self.namespace.trim_end_matches('/'),
            self.name,
            name
        );
        self.operations.push(OperationDescription {
            name,
            action,
            is_one_way: false,
        });
        self
    }

    pub fn with_one_way_operation(mut self, name: impl Into<String>) -> Self {
        self = self.with_operation(name);
        if let Some(op) = self.operations.last_mut() {
            op.is_one_way = true;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session_mode(&self) -> SessionMode {
        self.session_mode
    }

    pub fn callback_contract(&self) -> Option<&str> {
        self.callback_contract.as_deref()
    }

    pub fn operations(&self) -> &[OperationDescription] {
        &self.operations
    }

    /// True when only a duplex channel can serve this contract
    pub fn requires_duplex(&self) -> bool {
        self.callback_contract.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ServiceModelError::Configuration(
                "Contract name must not be empty".to_string(),
            ));
        }
        if self.operations.is_empty() {
            return Err(ServiceModelError::Configuration(format!(
                "Contract '{}' has no operations",
                self.name
            )));
        }
        Ok(())
    }
}

/// Address + binding + contract for one client endpoint
pub struct ServiceEndpoint<C> {
    name: Option<String>,
    address: Option<EndpointAddress>,
    binding: Option<Arc<dyn Binding<C>>>,
    contract: ContractDescription,
}

impl<C> ServiceEndpoint<C> {
    pub fn new(contract: ContractDescription) -> Self {
        Self {
            name: None,
            address: None,
            binding: None,
            contract,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_address(mut self, address: EndpointAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_binding(mut self, binding: Arc<dyn Binding<C>>) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> Option<&EndpointAddress> {
        self.address.as_ref()
    }

    pub fn binding(&self) -> Option<&Arc<dyn Binding<C>>> {
        self.binding.as_ref()
    }

    pub fn contract(&self) -> &ContractDescription {
        &self.contract
    }

    /// Timeouts of the bound transport, or the defaults when unbound
    pub fn timeouts(&self) -> BindingTimeouts {
        self.binding
            .as_ref()
            .map(|b| b.timeouts())
            .unwrap_or_default()
    }

    /// An endpoint without a binding can never be opened
    pub fn validate(&self) -> Result<()> {
        if self.binding.is_none() {
            return Err(ServiceModelError::Configuration(format!(
                "Endpoint for contract '{}' has no binding",
                self.contract.name()
            )));
        }
        self.contract.validate()
    }
}

impl<C> Clone for ServiceEndpoint<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            address: self.address.clone(),
            binding: self.binding.clone(),
            contract: self.contract.clone(),
        }
    }
}

impl<C> fmt::Debug for ServiceEndpoint<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("name", &self.name)
            .field("address", &self.address.as_ref().map(|a| a.to_string()))
            .field("binding", &self.binding.as_ref().map(|b| b.name().to_string()))
            .field("contract", &self.contract.name())
            .finish()
    }
}
