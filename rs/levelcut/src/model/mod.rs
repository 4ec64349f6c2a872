mod frame;
mod sample;
mod timestamp;

pub use frame::*;
pub use sample::*;
pub use timestamp::*;
