pub mod escaping;
pub use escaping::*;

pub mod printer;
pub use printer::*;
