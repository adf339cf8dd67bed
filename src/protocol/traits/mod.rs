//! Abstraction traits at the edges of the gateway core: host byte channels,
//! frame sinks, and timing.
pub mod byte_io;
pub mod frame_sink;
pub mod timer;
