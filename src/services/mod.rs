pub mod auth;
pub mod sessions;
pub mod totp;

pub use auth::AuthService;
pub use sessions::SessionService;
pub use totp::TotpService;
