pub mod params;
pub use params::*;

pub mod notices;
pub use notices::*;

pub mod timings;
pub use timings::*;

pub mod modifiers;
pub use modifiers::*;

pub mod context;
pub use context::*;
