//! # crdt-sync
//!
//! Operation-based CRDTs with causal command propagation between replicas.
//!
//! A CRDT (Conflict-free Replicated Data Type) is a data structure that can be
//! replicated across multiple devices and updated independently. Every local
//! mutation produces a command; once all replicas have applied the same
//! commands, in any order, they hold the same state without any coordination
//! or consensus.
//!
//! ## Quick Start
//!
//! ```
//! use crdt_sync::prelude::*;
//!
//! let phone = Replica::<String>::new("phone");
//! let laptop = Replica::<String>::new("laptop");
//!
//! let cart = phone.create_or_set(Some("cart")).unwrap();
//! cart.add("milk".to_string());
//!
//! // the laptop receives the whole history on connect
//! phone.connect(&laptop);
//! let on_laptop = laptop.find_or_set("cart").unwrap();
//! assert!(on_laptop.contains(&"milk".to_string()));
//!
//! on_laptop.add("bread".to_string());
//! assert_eq!(cart.len(), 2);
//! ```
//!
//! ## Available CRDTs
//!
//! ### Counters
//! - [`GCounter`] - Grow-only counter (increment only)
//! - [`PNCounter`] - Positive-negative counter (increment and decrement)
//!
//! ### Registers
//! - [`LWWRegister`] - Last-writer-wins register (vector clock, replica id tie-break)
//! - [`MVRegister`] - Multi-value register (preserves concurrent writes)
//!
//! ### Sets
//! - [`GSet`] - Grow-only set (add only)
//! - [`TwoPSet`] - Two-phase set (add and remove, remove is permanent)
//! - [`USet`] - Set of unique elements (add and remove, no tombstones)
//! - [`ORSet`] - Observed-remove set (add and remove freely)
//!
//! ### Sequences
//! - [`Rga`] - Replicated Growable Array (ordered list)
//!
//! ## The `Crdt` Trait
//!
//! All types implement the [`Crdt`] trait: local mutators publish commands on
//! an outbound [`Channel`], and [`Crdt::apply`] consumes commands produced
//! elsewhere. Applying is idempotent and commutative for causally unrelated
//! commands. Two instances can be linked directly with [`Crdt::connect`];
//! a [`Replica`] adds deduplication, history replay and transitive
//! forwarding on top.
//!
//! ## Features
//!
//! - `serde` (default): serde derives on clocks and commands,
//!   [`ReplicaConfig::from_toml`] and the [`wire`] encoding.

pub mod channel;
pub mod clock;
mod command;
mod config;
mod crdt;
mod error;
mod gcounter;
mod gset;
mod lww_register;
mod mv_register;
mod or_set;
mod pncounter;
mod registry;
mod replica;
mod rga;
mod twop_set;
mod uset;
#[cfg(feature = "serde")]
pub mod wire;

pub mod prelude;

pub use channel::{Channel, Connection, Subscription};
pub use clock::{StrictVectorClock, VectorClock};
pub use command::{AnyCrdt, ReplicaCommand, Replicated};
pub use config::{ReplicaBuilder, ReplicaConfig};
pub use crdt::{Command, Crdt, Value};
pub use error::{CrdtError, Result};
pub use gcounter::{GCounter, GCounterCommand};
pub use gset::{GSet, GSetCommand};
pub use lww_register::{LWWRegister, LWWRegisterCommand};
pub use mv_register::{Entry, MVRegister, MVRegisterCommand};
pub use or_set::{Element, ORSet, ORSetCommand};
pub use pncounter::{PNCounter, PNCounterCommand};
pub use registry::{Constructor, CrdtType, TypeRegistry};
pub use replica::Replica;
pub use rga::{Rga, RgaCommand};
pub use twop_set::{TwoPSet, TwoPSetCommand};
pub use uset::{USet, USetCommand};
