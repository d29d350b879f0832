pub mod field;
pub use field::*;

pub mod materializer;
pub use materializer::*;

pub mod table;
pub use table::*;

pub mod slots;
pub use slots::*;

pub mod warehouse;
pub use warehouse::*;

pub mod views;
pub use views::*;

pub mod defaults;
pub use defaults::*;

pub mod catalog;
pub use catalog::*;
