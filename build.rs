use std::path::PathBuf;

fn main() {
    let pb_dir = PathBuf::from("src/grpc/pb");
    if !pb_dir.exists() {
        std::fs::create_dir_all(&pb_dir).unwrap();
    }

    tonic_build::configure()
        .out_dir(pb_dir)
        // server stubs only with the server feature
        .server_mod_attribute("hello", "#[cfg(feature = \"server\")]")
        // client stubs only with the client feature
        .client_mod_attribute("hello", "#[cfg(feature = \"client\")]")
        .compile_protos(&["proto/hello.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("Failed to compile protos: {}", e));

    println!("cargo:rerun-if-changed=proto/hello.proto");
    println!("cargo:rerun-if-changed=build.rs");
}
