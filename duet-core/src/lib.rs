mod chat_id;
mod guard;
mod identity;
mod recipient;

pub use chat_id::*;
pub use guard::*;
pub use identity::*;
pub use recipient::*;
