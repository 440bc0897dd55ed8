//! Permissioned Streamlet-style consensus: block DAG, signed proposals and
//! votes, notarization, and three-in-a-row finalization, driven by a
//! deterministic in-memory broker.

pub mod consensus;
pub mod simulation;

pub use consensus::block::{Block, BlockDecodeError, Transaction};
pub use consensus::broker::Broker;
pub use consensus::chain::Chain;
pub use consensus::error::RejectReason;
pub use consensus::keys::KeyManager;
pub use consensus::messages::{Message, Proposal, Vote};
pub use consensus::node::{quorum_threshold, ConsensusNode, PublicKeyRegistry};
pub use simulation::Simulation;
