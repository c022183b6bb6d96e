pub mod aggregate;
pub mod cli;
pub mod console;
pub mod logging;
pub mod setup;
