mod process_claim;
mod process_create_dummy_csv;
mod process_create_pool;
mod process_reset;
mod process_stats;
mod process_status;

pub use process_claim::*;
pub use process_create_dummy_csv::*;
pub use process_create_pool::*;
pub use process_reset::*;
pub use process_stats::*;
pub use process_status::*;
