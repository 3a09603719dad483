pub mod handle;
pub mod scheduler;
pub mod status;
