mod arrayvec;
mod assert;
pub mod directories;
mod namespace;
mod thread;

pub use arrayvec::{ArrayStr, ArrayVec};
pub use namespace::{ShortTypename, short_typename};
pub use thread::{ThreadPriority, thread_boot};
