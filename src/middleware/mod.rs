//! Request middleware applied ahead of routing.

pub mod checks;
