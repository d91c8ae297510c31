pub mod archive;
pub mod config;
pub mod device;
pub mod fs;
pub mod redact;
pub mod runtime;
pub mod scan;
pub mod store;
pub mod support;
pub mod tooling;
