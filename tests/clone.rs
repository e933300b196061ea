//! End-to-end network clone (spec §8 scenario 6). Ignored by default since
//! it depends on reaching github.com; run explicitly with
//! `cargo test -- --ignored`.

use std::fs;
use std::process::Command;

#[test]
#[ignore]
fn clones_hello_world_from_github() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dest = tmp.path().join("Hello-World");

    let status = Command::new(env!("CARGO_BIN_EXE_minigit"))
        .arg("clone")
        .arg("https://github.com/octocat/Hello-World")
        .arg(&dest)
        .current_dir(tmp.path())
        .status()
        .expect("run minigit clone");
    assert!(status.success(), "clone subprocess exited with {status}");

    let git_dir = dest.join(".git");
    let head = fs::read_to_string(git_dir.join("HEAD")).expect("read HEAD");
    assert_eq!(head, "ref: refs/heads/main\n");

    let main_ref =
        fs::read_to_string(git_dir.join("refs/heads/main")).expect("read refs/heads/main");
    let commit_id = main_ref.trim();
    assert_eq!(commit_id.len(), 40, "ref should hold a 40-char sha1");

    let readme = fs::read_to_string(dest.join("README")).expect("checked-out README");
    assert!(!readme.is_empty());

    // Every object the ref reaches must be present in the loose store:
    // walk commit -> tree -> blobs and confirm each has an on-disk object file.
    let cat_file = |id: &str| -> bool {
        git_dir
            .join("objects")
            .join(&id[..2])
            .join(&id[2..])
            .exists()
    };
    assert!(cat_file(commit_id), "commit object missing from store");

    let ls_tree = Command::new(env!("CARGO_BIN_EXE_minigit"))
        .args(["cat-file", "-p", commit_id])
        .current_dir(&dest)
        .output()
        .expect("run minigit cat-file");
    assert!(ls_tree.status.success());
    let commit_text = String::from_utf8(ls_tree.stdout).expect("commit text is utf8");
    let tree_id = commit_text
        .lines()
        .find_map(|l| l.strip_prefix("tree "))
        .expect("commit has a tree line");
    assert!(cat_file(tree_id), "tree object missing from store");

    let ls_tree = Command::new(env!("CARGO_BIN_EXE_minigit"))
        .args(["ls-tree", "--name-only", tree_id])
        .current_dir(&dest)
        .output()
        .expect("run minigit ls-tree");
    assert!(ls_tree.status.success());
    let names = String::from_utf8(ls_tree.stdout).expect("ls-tree output is utf8");
    assert!(names.lines().any(|n| n == "README"));
}
