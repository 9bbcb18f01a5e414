fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only run linker script setup for hardware builds
    #[cfg(feature = "hardware")]
    {
        use std::env;
        use std::fs::File;
        use std::io::Write;
        use std::path::PathBuf;

        // Put `memory.x` in our output directory and ensure it's on the linker search path.
        let out = PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR not set")?);
        let memory_x = include_bytes!("../../memory.x");
        File::create(out.join("memory.x"))?.write_all(memory_x)?;
        println!("cargo:rustc-link-search={}", out.display());

        // cortex-m-rt, embassy-rp boot2 and defmt linker scripts, binary only.
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

        println!("cargo:rerun-if-changed=../../memory.x");
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
