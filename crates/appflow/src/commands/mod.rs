pub mod deploy;
pub mod remove;
pub mod validate;
