pub mod cache;
pub mod eval;
pub mod term;

pub use cache::*;
pub use eval::*;
pub use term::*;
