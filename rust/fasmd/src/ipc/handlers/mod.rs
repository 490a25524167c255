pub mod core;
pub mod rubric;
pub mod schedule;
