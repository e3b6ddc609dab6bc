//! Build script for the `native` backend.
//!
//! Without the `native` feature nothing is generated and the crate only ships the
//! in-process loopback backend. With it, the NDI SDK headers are run through
//! bindgen and the runtime library is linked.

#[cfg(feature = "native")]
fn main() {
    native::generate();
}

#[cfg(not(feature = "native"))]
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}

#[cfg(feature = "native")]
mod native {
    use std::env;
    use std::path::{Path, PathBuf};

    const UNIX_SDK_DIRS: &[&str] = &[
        "/usr/share/NDI Advanced SDK for Linux",
        "/usr/share/NDI SDK for Linux",
        "/Library/NDI SDK for Apple",
    ];

    fn sdk_dir() -> String {
        if let Ok(dir) = env::var("NDI_SDK_DIR") {
            return dir;
        }
        if cfg!(windows) {
            return "C:\\Program Files\\NDI\\NDI 6 SDK".to_string();
        }
        UNIX_SDK_DIRS
            .iter()
            .find(|dir| Path::new(dir).exists())
            .map(|dir| dir.to_string())
            .unwrap_or_else(|| panic!("NDI SDK not found, set NDI_SDK_DIR"))
    }

    pub fn generate() {
        println!("cargo:rerun-if-env-changed=NDI_SDK_DIR");
        println!("cargo:rerun-if-changed=build.rs");

        let sdk = sdk_dir();
        let include = format!("{sdk}/include");
        let header = format!("{include}/Processing.NDI.Lib.h");
        let target = env::var("TARGET").expect("TARGET not set");

        if cfg!(windows) {
            let arch = if target.contains("x86_64") { "x64" } else { "x86" };
            println!("cargo:rustc-link-search=native={sdk}\\lib\\{arch}");
            println!("cargo:rustc-link-lib=static=Processing.NDI.Lib.{arch}");
        } else {
            let advanced = sdk.to_lowercase().contains("advanced");
            println!("cargo:rustc-link-search=native={sdk}/lib/{target}");
            println!(
                "cargo:rustc-link-lib=dylib={}",
                if advanced { "ndi_advanced" } else { "ndi" }
            );
        }

        let bindings = bindgen::Builder::default()
            .header(header)
            .clang_arg(format!("-I{include}"))
            .derive_default(true)
            .generate()
            .expect("Unable to generate NDI bindings");

        let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
        bindings
            .write_to_file(out.join("ndi_lib.rs"))
            .expect("Couldn't write NDI bindings");
    }
}
