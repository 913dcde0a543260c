pub mod executor;
pub mod result;
