//! Construct tree model: the node taxonomy, the arena-backed tree with its
//! parent/index invariants, lexical scopes, and the structural outline used
//! by round-trip checks.
//!
//! Nothing in this module computes layout or validates insertions; it only
//! defines tree shape and identity. Derived positions are written by
//! `editing::build`, and legality decisions live in `editing::validate`.

pub mod node;
pub mod outline;
pub mod scope;
pub mod tree;

pub use node::{Compound, Construct, Node, NodeId, NodeKind, Slot, Token, TokenKind};
pub use outline::{derive_outline_from_render, OutlineEntry};
pub use scope::Scope;
pub use tree::Tree;
