//! Binary encoding of replica commands for byte transports.
//!
//! Commands are encoded with [postcard](https://docs.rs/postcard). The
//! encoding keeps the target crdt id, the command kind and its payload
//! (values, tags, clocks and replica ids).
//!
//! ```
//! use crdt_sync::{wire, CrdtType, ReplicaCommand};
//!
//! let announce = ReplicaCommand::<String>::Announce {
//!     crdt_type: CrdtType::ORSet,
//!     crdt_id: "basket".into(),
//! };
//! let bytes = wire::encode(&announce).unwrap();
//! assert_eq!(wire::decode::<String>(&bytes).unwrap(), announce);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::command::ReplicaCommand;
use crate::error::{CrdtError, Result};

/// Encode one command.
pub fn encode<T: Serialize>(command: &ReplicaCommand<T>) -> Result<Vec<u8>> {
    postcard::to_allocvec(command).map_err(|e| CrdtError::Wire(e.to_string()))
}

/// Decode one command produced by [`encode`].
pub fn decode<T: DeserializeOwned + Ord>(bytes: &[u8]) -> Result<ReplicaCommand<T>> {
    postcard::from_bytes(bytes).map_err(|e| CrdtError::Wire(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::sync::Arc;

    #[test]
    fn replica_history_survives_the_wire() {
        let a = Replica::<String>::new("a");
        let set = a.create_or_set(Some("basket")).unwrap();
        set.add("pear".to_owned());
        set.add("plum".to_owned());
        set.remove(&"pear".to_owned());
        let doc = a.create_rga(Some("doc")).unwrap();
        doc.push("x".to_owned());
        doc.remove(0).unwrap();

        let b = Replica::<String>::new("b");
        for command in a.history() {
            let bytes = encode(&command).unwrap();
            b.deliver(decode(&bytes).unwrap());
        }

        assert_eq!(b.history(), a.history());
        let on_b = b.find_or_set("basket").unwrap();
        assert_eq!(on_b.to_vec(), vec!["plum".to_owned()]);
        assert!(b.find_rga("doc").map(|d| d.is_empty()).unwrap_or(false));
    }

    #[test]
    fn clocks_keep_their_owner() {
        let a = Arc::new(Rga::new("a", "doc"));
        let sent = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let _sub = a.publish(move |command| log.lock().push(command.clone()));
        a.push(1u32);

        let command = ReplicaCommand::Rga(sent.lock()[0].clone());
        let decoded: ReplicaCommand<u32> = decode(&encode(&command).unwrap()).unwrap();
        match decoded {
            ReplicaCommand::Rga(RgaCommand::AddRight { clock, .. }) => {
                assert_eq!(clock.replica(), "a");
                assert_eq!(clock.clock().get("a"), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn orset_remove_keeps_observed_elements() {
        let pear = Element::new("pear".to_owned());
        let plum = Element::new("plum".to_owned());
        let command = ReplicaCommand::ORSet(ORSetCommand::Remove {
            crdt_id: "basket".into(),
            elements: [pear.clone(), plum].into_iter().collect(),
        });

        let decoded: ReplicaCommand<String> = decode(&encode(&command).unwrap()).unwrap();
        assert_eq!(decoded, command);
        match decoded {
            ReplicaCommand::ORSet(ORSetCommand::Remove { elements, .. }) => {
                assert!(elements.contains(&pear));
                assert_eq!(elements.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn garbage_is_a_wire_error() {
        assert!(matches!(
            decode::<String>(&[0xff, 0xff, 0xff]),
            Err(CrdtError::Wire(_))
        ));
    }
}
