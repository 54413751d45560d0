pub mod admin_two_factor;

pub use admin_two_factor::AdminTwoFactor;
