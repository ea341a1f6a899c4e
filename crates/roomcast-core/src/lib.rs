pub mod envelope;
pub mod protocol;
