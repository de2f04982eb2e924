pub mod completion;
pub mod health;
pub mod session;
