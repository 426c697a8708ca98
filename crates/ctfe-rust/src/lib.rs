//! Rust front end of the compile-time evaluation generator: source loading,
//! discovery of marked functions, call-site analysis, literal serialization
//! and synthesis of generated units.

pub mod attrs;
pub mod callsite;
pub mod discovery;
pub mod literal;
pub mod shape;
pub mod source;
pub mod symbols;
pub mod synth;

pub use callsite::CallSiteAnalyzer;
pub use discovery::discover_all;
pub use literal::serialize;
pub use shape::{check_return_capability, shape_of, shape_of_text};
pub use source::{load_crate, ParsedCrate, ParsedUnit, SourceText};
pub use symbols::SymbolIndex;
pub use synth::{synthesize, GroupResult};
