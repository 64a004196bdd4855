//! The narrow capability interface the workflow engine executes actions through.
//!
//! Per §6, the Tool Gateway is specified as "external, consumed, not defined here." This
//! module defines the trait the engine depends on (`ToolGateway`) plus one in-process,
//! sandboxed reference implementation (`LocalToolGateway`, built on the `fs_primitive`/
//! `process_primitive` building blocks and a naive `search_primitive`/`git_primitive`)
//! so the crate is testable end-to-end without a real external gateway wired in. The
//! engine only ever depends on the trait.

pub mod fs_primitive;
pub mod gateway;
pub mod git_primitive;
pub mod process_primitive;
pub mod safety;
pub mod search_primitive;

pub use gateway::{with_timeout, LocalToolGateway, ToolGateway, ToolResult};
pub use safety::{AllowDenyPolicy, PermissiveChecker, SafetyChecker, SafetyVerdict};
