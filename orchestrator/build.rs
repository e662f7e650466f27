fn main() {
    println!("cargo:rerun-if-changed=proto/agent.proto");
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile(&["proto/agent.proto"], &["proto"])
        .expect("failed to compile agent.proto");
}
