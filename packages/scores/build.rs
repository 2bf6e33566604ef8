use std::env;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("scores.rs");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let scores_dir = Path::new(&manifest_dir).join("scores");

    let mut entries: Vec<_> = if scores_dir.exists() {
        WalkDir::new(&scores_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .map(|e| e.into_path())
            .collect()
    } else {
        Vec::new()
    };
    entries.sort();

    let mut code = String::new();
    code.push_str("/// Embedded practice scores: (name, JSON)\n");
    code.push_str("pub static SCORES: &[(&str, &str)] = &[\n");
    for path in &entries {
        let relative_path = path.strip_prefix(&scores_dir).unwrap();
        let name = relative_path.with_extension("");
        let name = name.to_string_lossy().replace('\\', "/");
        code.push_str(&format!("    ({:?}, include_str!({:?})),\n", name, path.to_string_lossy()));
        println!("cargo:rerun-if-changed={}", path.display());
    }
    code.push_str("];\n");

    fs::write(&dest_path, code).unwrap();

    println!("cargo:rerun-if-changed=scores");
}
