pub mod session;
pub mod vote;
