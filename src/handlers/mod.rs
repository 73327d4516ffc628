pub mod config;
pub mod twilio;

pub use config::*;
pub use twilio::*;
