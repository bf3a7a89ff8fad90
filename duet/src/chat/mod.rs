mod handle;
mod listener;
mod manager;
mod subscription;

pub use handle::*;
pub use listener::*;
pub use manager::*;
pub use subscription::*;
