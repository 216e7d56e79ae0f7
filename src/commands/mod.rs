//! Subcommand handlers.
//!
//! | File          | Invocation          | Description                        |
//! |---------------|---------------------|------------------------------------|
//! | `run.rs`      | `rotbak start`      | Run the selected backup jobs       |
//! | `generate.rs` | `rotbak generate`   | Scaffold a job-config fragment     |

pub mod generate;
pub mod run;
