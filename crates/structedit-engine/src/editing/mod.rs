//! Editing core: everything that turns user intent into tree mutation and
//! keeps the derived state honest afterwards.
//!
//! The pipeline mirrors the data flow of the system: a cursor position is
//! resolved to a [`Context`](context::Context), the validation engine
//! approves/rejects/flags the pending operation, the session mutates the
//! tree, the build engine re-derives positions for everything that moved,
//! and queued notifications are dispatched on the bus. The session returns a
//! [`Patch`](patch::Patch) telling the external text surface exactly which
//! span to replace with what.
//!
//! Module structure:
//! - **`build`**: the build/rebuild engine for derived left/right boundaries
//! - **`context`**: cursor/selection to tree-focus resolution (pure reads)
//! - **`navigate`**: cursor movement in terms of context primitives
//! - **`validate`**: insertion legality and draft-mode bookkeeping
//! - **`events`**: per-node notification bus with deferred unsubscribe
//! - **`session`**: the editor session object and its command surface
//! - **`patch`**: edit result metadata for the external surface

pub mod build;
pub mod context;
pub mod events;
pub mod navigate;
pub mod patch;
pub mod session;
pub mod validate;

pub use context::Context;
pub use events::{CallbackId, EventBus, Notification, NotifyKind, Subscription};
pub use patch::{CursorState, Patch, TextEdit};
pub use session::{Cmd, EngineError, Session};
pub use validate::InsertionResult;
