pub mod span;
pub use span::*;

pub mod literal;
pub use literal::*;

pub mod types;
pub use types::*;

pub mod expr;
pub use expr::*;

pub mod query;
pub use query::*;

pub mod visit;
pub use visit::*;
