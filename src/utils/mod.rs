pub mod clock;
pub mod fs;

pub use clock::{Clock, ManualClock, SystemClock, system_clock};
