pub mod handlers;

#[cfg(feature = "server")]
pub mod server;

pub mod pb {
    /// Messages and stubs generated from `proto/hello.proto` by `build.rs`.
    pub mod hello;
}
