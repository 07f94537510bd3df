/// A monotonic millisecond clock.
///
/// Every deadline of the session is an absolute value of this clock, so the
/// only requirement is that it never goes backwards.
pub trait Clock {
    /// Returns the milliseconds elapsed since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Cooperatively yields the processor for a short while.
    ///
    /// Called on every iteration of a bounded busy-wait, such as the wait for
    /// a data channel peer.
    fn pause(&self);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn pause(&self) {
        (**self).pause();
    }
}
