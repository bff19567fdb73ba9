//! Stable integer identifiers for entities living in the [`crate::simulator::Simulator`] arena.
//!
//! The original implementation wires nodes, memories and channels together
//! with direct object references, which in Rust would mean a web of `Rc`
//! back-references. Instead every entity is addressed by a small `Copy`
//! newtype id and looked up through the arena each time it is needed. This
//! keeps ownership of the simulation state in one place (the `Simulator`)
//! and makes every borrow short-lived and checkable by the compiler.

use std::fmt;

macro_rules! def_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

def_id!(NodeId, "Identifies a node in the simulator's node arena.");
def_id!(ChannelId, "Identifies a quantum channel in the simulator's channel arena.");
def_id!(CChannelId, "Identifies a classical channel in the simulator's channel arena.");
def_id!(SlotId, "Identifies a single memory slot within a node's [`crate::memory::Memory`].");
def_id!(PathId, "Identifies an installed end-to-end path, assigned by the routing controller.");
def_id!(ReqId, "Identifies a routing request; one request may own several `PathId`s (MRSP_DYNAMIC).");
