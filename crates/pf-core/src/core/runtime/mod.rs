//! Runtime context, shell execution, and external tool discovery.

pub mod context;
pub mod process;
pub mod tools;

pub use context::Runtime;
pub use process::{
    is_timeout, run_shell, run_shell_streaming, EventPump, NoopPump, ShellError, ShellOutput,
};
pub use tools::{bundled_7z, find_executable, parse_code_page, seven_zip_name};
