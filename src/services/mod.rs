pub mod cipher;
pub mod totp;
pub mod trust;

pub use cipher::SecretCipher;
pub use totp::TotpService;
pub use trust::TrustTokenService;
