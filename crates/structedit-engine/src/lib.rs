pub mod ast;
pub mod editing;
pub mod pos;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use ast::{node::*, outline::*, scope::Scope, tree::*};
pub use editing::{
    build::*, context::*, events::*, navigate::*, patch::*, session::*, validate::*,
};
pub use pos::{Pos, Span};
