// Compiles cdylib/fixture_cblas.rs into a standalone shared object with the
// same rustc cargo is using, and exposes its path as BL2_FIXTURE_CBLAS.

use std::env;
use std::path::PathBuf;
use std::process::Command;

const SOURCE: &str = "cdylib/fixture_cblas.rs";

fn library_file_name(target_os: &str) -> &'static str {
    match target_os {
        "windows" => "bl2_fixture_cblas.dll",
        "macos" | "ios" => "libbl2_fixture_cblas.dylib",
        _ => "libbl2_fixture_cblas.so",
    }
}

fn main() -> Result<(), String> {
    println!("cargo:rerun-if-changed={SOURCE}");
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = env::var_os("CARGO_MANIFEST_DIR").ok_or("CARGO_MANIFEST_DIR is not set")?;
    let out_dir = env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?;
    let target = env::var("TARGET").map_err(|err| format!("TARGET is not set: {err}"))?;
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let rustc = env::var_os("RUSTC").unwrap_or_else(|| "rustc".into());

    let source = PathBuf::from(manifest_dir).join(SOURCE);
    let output = PathBuf::from(out_dir).join(library_file_name(&target_os));

    let status = Command::new(&rustc)
        .args(["--edition", "2024", "--crate-type", "cdylib"])
        .args(["--crate-name", "bl2_fixture_cblas", "-C", "opt-level=2"])
        .args(["--target", &target])
        .arg("-o")
        .arg(&output)
        .arg(&source)
        .status()
        .map_err(|err| format!("failed to launch {}: {err}", rustc.to_string_lossy()))?;
    if !status.success() {
        return Err(format!("compiling {} failed: {status}", source.display()));
    }

    println!("cargo:rustc-env=BL2_FIXTURE_CBLAS={}", output.display());
    Ok(())
}
