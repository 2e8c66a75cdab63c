//! Replica configuration.

use uuid::Uuid;

use crate::crdt::Value;
use crate::error::{CrdtError, Result};
use crate::registry::TypeRegistry;
use crate::replica::Replica;

/// Settings of one replica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReplicaConfig {
    /// Unique replica id. A random UUID is used when unset.
    pub replica_id: Option<String>,
}

impl ReplicaConfig {
    /// Configuration with an explicit replica id.
    pub fn with_replica_id(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: Some(replica_id.into()),
        }
    }

    /// Parse a configuration from TOML.
    ///
    /// ```
    /// use crdt_sync::ReplicaConfig;
    ///
    /// let config = ReplicaConfig::from_toml(r#"replica_id = "edge-7""#).unwrap();
    /// assert_eq!(config.replica_id.as_deref(), Some("edge-7"));
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| CrdtError::Config(e.to_string()))
    }

    /// The configured id, or a fresh random one.
    ///
    /// Fails if an id is configured but empty.
    pub fn resolved_replica_id(&self) -> Result<String> {
        match self.replica_id.as_deref() {
            Some("") => Err(CrdtError::InvalidArgument(
                "replica id must not be empty".into(),
            )),
            Some(id) => Ok(id.to_owned()),
            None => Ok(Uuid::new_v4().to_string()),
        }
    }
}

/// Builder for a [`Replica`] with custom configuration.
///
/// ```
/// use crdt_sync::{Replica, TypeRegistry};
///
/// let replica = Replica::<String>::builder()
///     .replica_id("node-1")
///     .registry(TypeRegistry::standard())
///     .build()
///     .unwrap();
/// assert_eq!(replica.id(), "node-1");
/// ```
#[derive(Debug)]
pub struct ReplicaBuilder<T: Value> {
    config: ReplicaConfig,
    registry: TypeRegistry<T>,
}

impl<T: Value> ReplicaBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
            registry: TypeRegistry::standard(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ReplicaConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the replica id.
    pub fn replica_id(mut self, replica_id: impl Into<String>) -> Self {
        self.config.replica_id = Some(replica_id.into());
        self
    }

    /// Set the registry used to instantiate announced CRDTs.
    pub fn registry(mut self, registry: TypeRegistry<T>) -> Self {
        self.registry = registry;
        self
    }

    /// Build the replica.
    pub fn build(self) -> Result<Replica<T>> {
        let id = self.config.resolved_replica_id()?;
        Ok(Replica::from_parts(id, self.registry))
    }
}
