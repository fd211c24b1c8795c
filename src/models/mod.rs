pub mod process;
pub mod reading;

pub use process::{Process, Subprocess};
pub use reading::{ActivityKind, Reading, ReadingForm, StoredReading};
