pub mod handlers;
pub mod password;
pub mod session;
pub mod temp_codes;

pub use session::AuthError;
