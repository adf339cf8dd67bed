//! Destination of frames fanned out by the router.
use crate::protocol::can_frame::CanFrame;

/// Consumer of received frames. Delivery must not block: a sink that cannot
/// take the frame right now drops and counts it.
pub trait FrameSink {
    fn deliver(&mut self, frame: &CanFrame);
}

impl<F: FrameSink + ?Sized> FrameSink for &mut F {
    fn deliver(&mut self, frame: &CanFrame) {
        (**self).deliver(frame)
    }
}
