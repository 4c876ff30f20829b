pub mod account;

pub use account::*;

pub use account::AccountError;
