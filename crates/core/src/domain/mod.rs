pub mod candidate;
pub mod preferences;
pub mod session;
