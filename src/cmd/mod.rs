/*!
Subcommand modules.

Conventions:
  - Each subcommand module exposes exactly one public `execute_*` function
    that returns `anyhow::Result<()>`.
  - Argument structs derive `clap::Args` and are kept minimal.
  - Shared runtime helpers (target resolution, schema-driven argument
    building) live in `shared.rs`.
*/

pub mod call;
pub mod chat;
pub mod format;
pub mod serve;
pub mod shared;
pub mod tools;

pub use call::{CallArgs, execute_call};
pub use chat::{ChatArgs, execute_chat};
pub use serve::{ServeArgs, execute_serve};
pub use tools::{ToolsArgs, execute_tools};
