pub mod directory;
pub mod dispatch;
pub mod pool;
pub mod queue;
pub mod scoring;
