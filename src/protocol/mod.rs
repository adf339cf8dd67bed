//! Gateway components: the CAN frame, the bus manager and its engine
//! interface, the GVRET and SLCAN host codecs, the byte arbiter, the frame
//! router, and the traits at their edges.
pub mod arbiter;
pub mod bus;
pub mod can_frame;
pub mod gvret;
pub mod router;
pub mod slcan;
pub mod traits;

#[cfg(test)]
pub(crate) mod fake;
