//! # Remote Object Proxy
//!
//! A `RemoteObject` stands in for an object living inside the plugin. Its
//! members are only known at runtime, from the descriptor the plugin returned
//! when the object was created, so access goes through `get`, `set` and `call`
//! by name rather than through a compile-time interface.
//!
//! ## Invariants
//!
//! - Holding a proxy is both necessary and sufficient to operate on the object.
//! - Several proxies may share one object id; they are interchangeable.
//! - Members absent from the descriptor are rejected locally and never sent.

use std::sync::Arc;

use tracing::trace;

use nmrpc::ObjectDescriptor;
use nmrpc::ObjectId;
use nmrpc::Operation;

use crate::bridge::Bridge;
use crate::bridge::Error;
use crate::bridge::Result;
use crate::value::Value;

/// Capability to operate on one plugin object.
#[derive(Clone)]
pub struct RemoteObject {
    bridge: Bridge,
    descriptor: Arc<ObjectDescriptor>,
}

impl RemoteObject {
    pub fn new(bridge: Bridge, descriptor: ObjectDescriptor) -> Self {
        Self { bridge, descriptor: Arc::new(descriptor) }
    }

    pub fn id(&self) -> ObjectId {
        self.descriptor.id
    }

    pub fn properties(&self) -> &[String] {
        &self.descriptor.properties
    }

    pub fn methods(&self) -> &[String] {
        &self.descriptor.methods
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.descriptor.properties.iter().any(|p| p == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.descriptor.methods.iter().any(|m| m == name)
    }

    /// The bridge this proxy issues its calls through.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Same object, calls issued through `bridge` instead.
    ///
    /// Used to attach a scoped (cancellable) bridge to an existing object.
    pub fn with_bridge(&self, bridge: Bridge) -> Self {
        Self { bridge, descriptor: self.descriptor.clone() }
    }

    /// Reads a property.
    pub async fn get(&self, name: &str) -> Result<Value> {
        self.require(self.has_property(name), name)?;
        trace!(object = %self.id(), property = name, "get");
        self.bridge
            .invoke(Some(self.id()), Operation::GetProperty { name: name.to_string() })
            .await
    }

    /// Writes a property.
    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.require(self.has_property(name), name)?;
        let value = self.bridge.encode_arg(&value.into())?;
        trace!(object = %self.id(), property = name, "set");
        self.bridge
            .invoke(Some(self.id()), Operation::SetProperty { name: name.to_string(), value })
            .await
            .map(|_| ())
    }

    /// Invokes a method.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.require(self.has_method(name), name)?;
        let params = self.bridge.encode_args(&args)?;
        trace!(object = %self.id(), method = name, argc = params.len(), "call");
        self.bridge
            .invoke(Some(self.id()), Operation::CallMethod { name: name.to_string(), params })
            .await
    }

    fn require(&self, declared: bool, member: &str) -> Result<()> {
        if declared {
            Ok(())
        } else {
            Err(Error::UnknownMember { object: self.id(), member: member.to_string() })
        }
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.descriptor.id)
            .field("properties", &self.descriptor.properties)
            .field("methods", &self.descriptor.methods)
            .finish()
    }
}
