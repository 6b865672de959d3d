use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// ~/.anthropic_usage
pub fn home_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".anthropic_usage")
}

/// `Foo.app/Contents/MacOS/<bin>` → `Foo.app/Contents/Resources`
pub fn bundle_resources_dir(exe: &Path) -> Option<PathBuf> {
    let macos = exe.parent()?;
    let contents = macos.parent()?;
    let bundle = contents.parent()?;
    let is_bundle = macos.file_name()? == "MacOS"
        && contents.file_name()? == "Contents"
        && bundle.extension().is_some_and(|ext| ext == "app");
    is_bundle.then(|| contents.join("Resources"))
}

/// Fallback config locations in search order: cwd, binary dir, home dotdir,
/// binary dir with symlinks resolved, platform config dir, app bundle.
pub fn candidate_config_paths() -> Vec<PathBuf> {
    let exe = std::env::current_exe().ok();
    let real_exe = exe.as_ref().and_then(|p| p.canonicalize().ok());

    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = exe.as_deref().and_then(Path::parent) {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths.push(home_config_dir().join(CONFIG_FILE_NAME));
    if let Some(dir) = real_exe.as_deref().and_then(Path::parent) {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("anthropic-usage").join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = real_exe.as_deref().and_then(bundle_resources_dir) {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    dedup_in_order(paths)
}

fn dedup_in_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}
