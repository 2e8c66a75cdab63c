//! Type tags and the constructors a replica uses to instantiate CRDTs
//! announced by its peers.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{AnyCrdt, Replicated};
use crate::crdt::Value;
use crate::{GCounter, GSet, LWWRegister, MVRegister, ORSet, PNCounter, Rga, TwoPSet, USet};

/// Identifies the type of a CRDT in announce commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CrdtType {
    /// Grow-only counter.
    GCounter = 1,
    /// Positive-negative counter.
    PNCounter = 2,
    /// Grow-only set.
    GSet = 3,
    /// Two-phase set.
    TwoPSet = 4,
    /// Last-writer-wins register.
    LWWRegister = 5,
    /// Multi-value register.
    MVRegister = 6,
    /// Observed-remove set.
    ORSet = 7,
    /// Replicated Growable Array.
    Rga = 8,
    /// Set of unique, never reused elements.
    USet = 9,
}

impl CrdtType {
    /// Every known type, in tag order.
    pub const ALL: [CrdtType; 9] = [
        Self::GCounter,
        Self::PNCounter,
        Self::GSet,
        Self::TwoPSet,
        Self::LWWRegister,
        Self::MVRegister,
        Self::ORSet,
        Self::Rga,
        Self::USet,
    ];

    /// Look a type up by its numeric tag.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u8 == tag)
    }
}

impl fmt::Display for CrdtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Builds a fresh instance: `(replica_id, crdt_id) -> handle`.
pub type Constructor<T> = fn(&str, &str) -> AnyCrdt<T>;

fn construct<T: Value, C: Replicated<T>>(replica_id: &str, crdt_id: &str) -> AnyCrdt<T> {
    C::wrap(Arc::new(C::create(replica_id, crdt_id)))
}

/// Maps [`CrdtType`] tags to constructors.
///
/// A replica only instantiates announced CRDTs whose type is registered;
/// announces of other types are ignored.
///
/// # Example
///
/// ```
/// use crdt_sync::{CrdtType, GCounter, TypeRegistry};
///
/// let mut registry = TypeRegistry::<String>::empty();
/// registry.register::<GCounter>();
/// assert!(registry.contains(CrdtType::GCounter));
/// assert!(!registry.contains(CrdtType::Rga));
/// ```
pub struct TypeRegistry<T: Value> {
    constructors: HashMap<CrdtType, Constructor<T>>,
}

impl<T: Value> TypeRegistry<T> {
    /// A registry that knows no type.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry that knows every CRDT of this crate.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<GCounter>()
            .register::<PNCounter>()
            .register::<GSet<T>>()
            .register::<TwoPSet<T>>()
            .register::<USet<T>>()
            .register::<ORSet<T>>()
            .register::<LWWRegister<T>>()
            .register::<MVRegister<T>>()
            .register::<Rga<T>>();
        registry
    }

    /// Register the default constructor of `C`.
    pub fn register<C: Replicated<T>>(&mut self) -> &mut Self {
        self.register_constructor(C::CRDT_TYPE, construct::<T, C>)
    }

    /// Register or replace the constructor used for `crdt_type`.
    pub fn register_constructor(
        &mut self,
        crdt_type: CrdtType,
        constructor: Constructor<T>,
    ) -> &mut Self {
        self.constructors.insert(crdt_type, constructor);
        self
    }

    /// Forget `crdt_type`.
    pub fn unregister(&mut self, crdt_type: CrdtType) -> &mut Self {
        self.constructors.remove(&crdt_type);
        self
    }

    /// Whether `crdt_type` can be instantiated.
    #[must_use]
    pub fn contains(&self, crdt_type: CrdtType) -> bool {
        self.constructors.contains_key(&crdt_type)
    }

    /// Instantiate `crdt_type`, or `None` if it is not registered.
    #[must_use]
    pub fn construct(
        &self,
        crdt_type: CrdtType,
        replica_id: &str,
        crdt_id: &str,
    ) -> Option<AnyCrdt<T>> {
        self.constructors
            .get(&crdt_type)
            .map(|constructor| constructor(replica_id, crdt_id))
    }
}

impl<T: Value> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self::standard()
    }
}

impl<T: Value> Clone for TypeRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            constructors: self.constructors.clone(),
        }
    }
}

impl<T: Value> fmt::Debug for TypeRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<CrdtType> = self.constructors.keys().copied().collect();
        types.sort_by_key(|t| *t as u8);
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}
