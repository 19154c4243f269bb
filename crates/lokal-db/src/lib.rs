pub mod pool;
pub mod repos;

// Re-export commonly used items
pub use pool::{create_pool, run_migrations};
pub use repos::profile::{NewProfile, ProfileRepo, ProfileRow};
pub use repos::user::{UserRepo, UserRow};
pub use repos::voucher::{NewVoucherRow, VoucherRepo, VoucherRow};
