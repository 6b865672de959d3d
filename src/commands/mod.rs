pub mod check;
pub mod config_cmd;

pub use check::CheckArgs;
pub use config_cmd::ConfigSub;
