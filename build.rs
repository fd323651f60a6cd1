fn main() {
    // Stamped into `lasergate::BUILD_DATE`, logged at startup
    let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
    println!("cargo:rustc-env=BUILD_DATE={}", stamp);
    println!("cargo:rerun-if-changed=build.rs");
}
