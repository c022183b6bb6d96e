pub mod monitor;
pub mod pool;
