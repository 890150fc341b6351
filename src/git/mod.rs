// Git module providing the repository access a replay needs

mod backend;
mod commit;
mod repository;
mod utils;

pub use backend::GitCli;
pub use commit::{RecentCommit, civil_time, date_mismatches};
pub use repository::GitRepo;

pub use utils::*;
