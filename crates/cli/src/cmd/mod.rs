mod info;
mod profiles;
mod run;

pub use info::cmd_info;
pub use profiles::cmd_profiles;
pub use run::{RunArgs, cmd_run};
