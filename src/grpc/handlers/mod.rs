#[cfg(feature = "server")]
pub mod hello;
