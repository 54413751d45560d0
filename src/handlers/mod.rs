pub mod health;
pub mod session;
pub mod two_factor;

pub use health::health_check;
pub use session::SessionUser;
pub use two_factor::{clear_trust, setup_2fa, two_factor_status, verify_2fa};
