pub mod error_loop;

pub use error_loop::ErrorLoopGuard;
