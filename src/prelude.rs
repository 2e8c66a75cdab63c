//! Convenient re-exports for common usage.
//!
//! ```
//! use crdt_sync::prelude::*;
//! ```

pub use crate::{Command, Crdt};
pub use crate::{CrdtError, CrdtType, Replica, ReplicaCommand};
pub use crate::{Element, Entry};
pub use crate::{GCounter, GCounterCommand};
pub use crate::{GSet, GSetCommand};
pub use crate::{LWWRegister, LWWRegisterCommand};
pub use crate::{MVRegister, MVRegisterCommand};
pub use crate::{ORSet, ORSetCommand};
pub use crate::{PNCounter, PNCounterCommand};
pub use crate::{Rga, RgaCommand};
pub use crate::{TwoPSet, TwoPSetCommand};
pub use crate::{USet, USetCommand};
