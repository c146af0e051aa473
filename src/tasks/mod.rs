// src/tasks/mod.rs

//! Ready-made task kinds covering the common build chores: copying files,
//! spawning tool processes and emitting generated files. Anything more
//! specialized implements [`Task`](crate::task::Task) directly.

pub mod copy;
pub mod generate;
pub mod process;

pub use copy::CopyTask;
pub use generate::GenerateFileTask;
pub use process::ProcessTask;
