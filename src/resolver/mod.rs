pub mod functions;
pub use functions::*;

pub mod scope;
pub use scope::*;

pub mod lazy;
pub use lazy::*;

pub mod resolver;
pub use resolver::*;
