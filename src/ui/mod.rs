pub mod update_loop;

pub use update_loop::{LoopExit, UpdateLoop, UpdateLoopConfig};
