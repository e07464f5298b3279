//! Embedded fallback prompts, compiled into the binary.
//!
//! Mirrors the teacher's two-tier translation loader: a user-editable file on
//! disk is preferred, but the crate always has something to fall back to so
//! a fresh agent directory is never left without system/step prompts.

/// The default system prompt template, used when no `system.md` (or
/// equivalent) is found on disk for an agent.
pub const SYSTEM: &str = include_str!("fallback/system.md");

/// The default step prompt template, used when a step has no prompt file of
/// its own under the C3L path layout.
pub const STEP_DEFAULT: &str = include_str!("fallback/step_default.md");
