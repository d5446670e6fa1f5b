fn main() {
    println!("cargo:rerun-if-changed=native/guard.c");

    // sigsetjmp and __try have no Rust equivalent
    cc::Build::new()
        .file("native/guard.c")
        .warnings(true)
        .compile("rendergate_guard");
}
