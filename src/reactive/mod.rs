//! Refreshable UI: argument binding and in-place re-rendering.
//!
//! - [`Arguments`] / [`BoundArguments`] — call values and their binding
//!   against declared parameter names.
//! - [`Refreshable`] — synchronous UI function rebuilt by `refresh`.
//! - [`AsyncRefreshable`] — asynchronous variant that swaps output in only
//!   once the new render is complete.

pub mod arguments;
pub mod refreshable;

pub use arguments::{Arguments, BoundArguments};
pub use refreshable::{AsyncRefreshable, Refreshable, ANCHOR_TAG};
