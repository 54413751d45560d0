pub mod admin_two_factor;
pub mod in_memory;

pub use admin_two_factor::{AdminTwoFactorRepository, TwoFactorStore};
pub use in_memory::InMemoryTwoFactorStore;
