use std::process::Command;

fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

/// Short commit hash, suffixed `-dirty` when the worktree has changes.
fn commit_hash() -> Option<String> {
    let head = git(&["rev-parse", "--short", "HEAD"]).filter(|o| o.status.success())?;
    let hash = String::from_utf8_lossy(&head.stdout).trim().to_string();
    let dirty = git(&["diff", "--quiet"]).is_some_and(|o| !o.status.success());
    Some(if dirty { format!("{hash}-dirty") } else { hash })
}

fn main() {
    // Container builds without .git pass the hash in explicitly
    let git_hash = std::env::var("GIT_HASH")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(commit_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={git_hash}");
    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
