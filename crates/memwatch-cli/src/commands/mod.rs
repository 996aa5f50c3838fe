pub mod modules;
pub mod resolve;
pub mod watch;
