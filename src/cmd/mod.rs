//! CLI command implementations.
//!
//! | Module     | Commands handled   |
//! |------------|--------------------|
//! | `serve`    | `Serve`            |
//! | `projects` | `Init`, `List`     |
//! | `config`   | `Config`           |

pub mod config;
pub mod projects;
pub mod serve;

pub use config::cmd_config;
pub use projects::{cmd_init, cmd_list};
pub use serve::cmd_serve;
