pub mod health;
pub mod session;
pub mod sign_out;

pub use sign_out::SignOutConfig;
