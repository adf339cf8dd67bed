//! `korri-gateway` library: the core of a multi-bus CAN to host gateway in a
//! `no_std` environment. It exposes the bus manager and its engine traits, the
//! two host protocols (GVRET binary and SLCAN line), the byte arbiter and frame
//! router gluing them together, and the task topology that drives them.
#![no_std]

#[cfg(test)]
extern crate std;
//==================================================================================
/// Compile-time limits and the runtime gateway configuration.
pub mod core;
/// Local-recovery error taxonomy and the fatal startup error.
pub mod error;
/// Reusable building blocks: lock-free frame ring and double-buffered snapshot.
pub mod infra;
/// CAN frames, bus manager, host protocol codecs, router and arbiter.
pub mod protocol;
/// Task table, idle policy and the async loops run on each core.
pub mod runtime;
/// Task/CPU statistics collected for the shell.
pub mod stats;
//==================================================================================
