// MIT License
// Copyright 2023--present dpf-core developers

use std::env;
use std::path::PathBuf;

/// Generate the C header via cbindgen (only when `gen-header` is active).
/// Run `cargo build --features gen-header` to regenerate `include/dpf.h`.
#[cfg(feature = "gen-header")]
fn generate_c_header(crate_dir: &str) {
    let output_dir = PathBuf::from(crate_dir).join("include");
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = cbindgen::Config::from_file("cbindgen.toml")
        .expect("Unable to find cbindgen.toml");

    cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
        .expect("Unable to generate C bindings")
        .write_to_file(output_dir.join("dpf.h"));
}

#[cfg(feature = "rpc")]
fn compile_schema(crate_dir: &str) {
    let schema_dir = PathBuf::from(crate_dir).join("schema");
    capnpc::CompilerCommand::new()
        .src_prefix(&schema_dir)
        .default_parent_module(vec!["rpc".into()])
        .file(schema_dir.join("Dpf.capnp"))
        .run()
        .expect("Failed to compile Cap'n Proto schema");
}

fn main() {
    #[allow(unused_variables)]
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    println!("cargo:rerun-if-changed=schema/Dpf.capnp");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    #[cfg(feature = "gen-header")]
    generate_c_header(&crate_dir);

    #[cfg(feature = "rpc")]
    compile_schema(&crate_dir);
}
