//! # Quantum Repeater Network Simulator
//!
//! A discrete-event simulator for entanglement distribution over quantum
//! repeater networks. It models elementary entanglement generation on
//! fibre links, storage in finite-capacity, finite-coherence-time quantum
//! memories, and end-to-end delivery through entanglement swapping
//! orchestrated by a central routing controller.
//!
//! This crate provides the simulation engine and the proactive-routing
//! data plane (link layer, forwarder, multiplex and cut-off schemes,
//! routing controller, timing modes). It does not provide topology file
//! loading, plotting, or a command-line front-end, so that callers can
//! bring their own scenario construction and reporting on top of the
//! engine.

#[macro_use]
extern crate serde_derive;

pub mod channel;
pub mod config;
pub mod cutoff;
pub mod epr;
pub mod error;
pub mod event;
pub mod fib;
pub mod forwarder;
pub mod ids;
pub mod link_layer;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod mux;
pub mod node;
pub mod rng;
pub mod routing;
pub mod scheduler;
pub mod simulator;
pub mod time;
pub mod timing;

pub use error::{Result, SimError};
pub use simulator::Simulator;
