pub mod command;
pub mod intent;
pub mod provider;
pub mod resolution;
pub mod understanding;

pub use command::*;
pub use intent::*;
pub use provider::*;
pub use resolution::*;
pub use understanding::*;
