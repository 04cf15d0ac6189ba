use std::path::{Path, PathBuf};
use std::process::Command;

const BINARY: &str = "velox";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("install") => install(args.get(1).map(PathBuf::from)),
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}");
            usage();
            std::process::exit(1);
        }
        None => {
            usage();
            std::process::exit(1);
        }
    }
}

fn usage() {
    eprintln!("Usage: cargo xtask <command>");
    eprintln!("\nAvailable commands:");
    eprintln!("  install [dir]    Build velox in release mode and copy it to dir (default ~/.cargo/bin)");
}

fn install(dest_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Building {BINARY} in release mode...\n");

    let status = Command::new(std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["build", "--release", "-p", BINARY])
        .status()?;
    if !status.success() {
        return Err(format!("cargo build exited with {status}").into());
    }

    let dest_dir = match dest_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .ok_or("Could not determine home directory")?
            .join(".cargo")
            .join("bin"),
    };
    std::fs::create_dir_all(&dest_dir)?;

    let file_name = format!("{BINARY}{}", std::env::consts::EXE_SUFFIX);
    let src = Path::new("target/release").join(&file_name);
    if !src.exists() {
        return Err(format!("{} not found after build", src.display()).into());
    }

    let dst = dest_dir.join(&file_name);
    // a running velox keeps its inode; replace rather than overwrite
    if dst.exists() {
        std::fs::remove_file(&dst)?;
    }
    std::fs::copy(&src, &dst)?;
    println!("✓ {} installed to {}", BINARY, dst.display());
    Ok(())
}
