use std::time::Duration;

/// Blocking pause between attempts and items.
///
/// The worker only ever sleeps through this trait, so tests can record the
/// requested delays instead of waiting them out.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
