pub mod case;
pub mod msg;
pub mod sample;
pub mod serde;
pub mod tx;

pub use case::*;
pub use msg::*;
pub use sample::*;
pub use tx::*;
