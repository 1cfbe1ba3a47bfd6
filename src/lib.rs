//! Watch expressions for a simulated-CPU debugger: a small C-like expression
//! language, an interning expression cache, and cached incremental evaluation
//! against a live program.

pub mod ast;
pub mod config;
pub mod env;
pub mod errors;
pub mod lex;
pub mod logging;
pub mod ops;
pub mod parse;
pub mod traits;
pub mod types;
pub mod value;
pub mod watch;

pub use ast::{CachePolicy, CachedEvaluator, ExpressionCache, Term, TermRef};
pub use config::Config;
pub use env::{Environment, FlatEnvironment, ZeroEnvironment};
pub use errors::{EnvError, ErrorPrinter, ParseError};
pub use parse::Parser;
pub use types::TypeInfo;
pub use value::Value;
pub use watch::{WatchExpression, WatchList};
