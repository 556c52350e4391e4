//! Remote interface descriptors.
//!
//! A remote interface is a named set of method signatures. Per the
//! spec, every method of a remote interface must declare the transport
//! error in its failure set; an interface with even one method that
//! doesn't is rejected at stub/skeleton construction time
//! (`RemoteError::BadInterface`). In Rust there is no checked-exception
//! list to inspect reflectively, so the declaration is made explicit:
//! each interface hand-authors a `&'static [MethodDescriptor]` table
//! (mirroring the teacher's method table built from the 9P `FCall`
//! variants) and `declares_transport_error` is a field on that table,
//! checked once when a `Skeleton`/`Stub` is built.

/// One method of a remote interface.
#[derive(Clone, Copy, Debug)]
pub struct MethodDescriptor {
    /// Method name, used as the primary dispatch key.
    pub name: &'static str,
    /// Ordered parameter type tags; together with `name` this forms the
    /// signature key the skeleton uses to reject mismatched calls with
    /// `NoSuchMethod` rather than treating it as a service error.
    pub params: &'static [&'static str],
    /// Whether this method's declared failure set includes the
    /// transport error. Every real interface in this workspace sets
    /// this to `true` for all its methods; it exists as a field (not a
    /// hardcoded assumption) so the "non-remote rejection" invariant
    /// is actually checked rather than vacuously true.
    pub declares_transport_error: bool,
}

/// The full descriptor of a remote interface.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceDescriptor {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
}

impl InterfaceDescriptor {
    /// Validates the "every method declares the transport error"
    /// invariant. Interfaces that fail this check cannot back a
    /// `Skeleton` or a `Stub`.
    pub fn validate(&self) -> Result<(), crate::error::RemoteError> {
        for m in self.methods {
            if !m.declares_transport_error {
                return Err(crate::error::RemoteError::BadInterface(format!(
                    "{}::{} does not declare the transport error",
                    self.name, m.name
                )));
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str, params: &[String]) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| {
            m.name == name && m.params.len() == params.len() && m.params.iter().zip(params).all(|(a, b)| *a == b)
        })
    }
}

/// Implemented by the marker type of each concrete remote interface
/// (`NamingInterface`, `StorageClientInterface`, ...). The marker type
/// itself carries no data; it exists purely to parameterize `Stub<I>`
/// and `Skeleton`'s descriptor validation.
pub trait RemoteInterface {
    fn descriptor() -> InterfaceDescriptor;
}
