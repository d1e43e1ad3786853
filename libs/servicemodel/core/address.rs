use crate::error::{Result, ServiceModelError};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Header attached to every message sent to an address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressHeader {
    pub name: String,
    pub namespace: String,
    pub value: String,
}

/// Where a service lives: URI plus optional headers and expected identity
///
/// Equality is structural: two addresses are equal when URI, headers (in
/// order) and identity all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    uri: Url,
    headers: Vec<AddressHeader>,
    identity: Option<String>,
}

impl EndpointAddress {
    /// Parse an absolute URI
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = Url::parse(uri).map_err(|e| {
            ServiceModelError::Configuration(format!("Invalid endpoint address '{}': {}", uri, e))
        })?;
        Ok(Self::from_url(uri))
    }

    pub fn from_url(uri: Url) -> Self {
        Self {
            uri,
            headers: Vec::new(),
            identity: None,
        }
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push(AddressHeader {
            name: name.into(),
            namespace: namespace.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[inline]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[inline]
    pub fn scheme(&self) -> &str {
        self.uri.scheme()
    }

    pub fn headers(&self) -> &[AddressHeader] {
        &self.headers
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

impl FromStr for EndpointAddress {
    type Err = ServiceModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri.as_str())
    }
}
