/// Type-state markers for the client builder
///
/// Track at compile time whether an endpoint source was chosen, so `build()`
/// only exists once it has been.

use std::marker::PhantomData;

/// Marker trait for endpoint state
pub trait EndpointState {}

/// No endpoint source chosen yet
pub struct NoEndpoint;
impl EndpointState for NoEndpoint {}

/// Endpoint source chosen
pub struct HasEndpoint;
impl EndpointState for HasEndpoint {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<E> {
    _endpoint: PhantomData<E>,
}

impl<E> TypeState<E> {
    pub(crate) fn new() -> Self {
        Self {
            _endpoint: PhantomData,
        }
    }
}

impl<E> Default for TypeState<E> {
    fn default() -> Self {
        Self::new()
    }
}
