//! Publishing into a git remote. Skipped when `git` is not installed.

use std::path::Path;
use std::process::Command;

use webmirror::publish::git::{GitPublisher, GitPublisherConfig};
use webmirror::publish::{MirrorPublisher, PublishOutcome};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn bare_remote(root: &Path) -> String {
    let remote = root.join("mirror.git");
    std::fs::create_dir_all(&remote).unwrap();
    git(&remote, &["init", "--bare", "--quiet"]);
    remote.to_string_lossy().into_owned()
}

fn publisher(remote: &str, workdir: &Path) -> GitPublisher {
    GitPublisher::new(GitPublisherConfig {
        remote: remote.to_string(),
        branch: "main".into(),
        workdir: workdir.to_path_buf(),
        author_name: "Mirror Bot".into(),
        author_email: "mirror@example.com".into(),
        token: None,
        push: true,
    })
}

fn stage(root: &Path, files: &[(&str, &str)]) {
    for (relative, body) in files {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
}

#[tokio::test]
async fn first_publish_creates_branch_then_identical_tree_is_a_no_op() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let remote = bare_remote(tmp.path());
    let staged = tmp.path().join("stage");
    stage(
        &staged,
        &[
            ("index.html", "<html></html>\n"),
            ("sw.js", "self.ASSETS = [];\n"),
            ("responsive-web/client-web/main.js", "main()\n"),
        ],
    );

    let first = publisher(&remote, &tmp.path().join("clone-1"));
    assert_eq!(first.published_file("index.html").await.unwrap(), None);
    let outcome = first.publish(&staged, "Web build: 0123456").await.unwrap();
    let revision = match outcome {
        PublishOutcome::Published {
            revision: Some(revision),
        } => revision,
        other => panic!("expected a commit, got {other:?}"),
    };

    let remote_dir = Path::new(&remote);
    assert_eq!(git(remote_dir, &["rev-parse", "refs/heads/main"]), revision);
    assert_eq!(
        git(remote_dir, &["log", "-1", "--format=%s|%an|%ae", "main"]),
        "Web build: 0123456|Mirror Bot|mirror@example.com"
    );
    assert_eq!(
        git(remote_dir, &["show", "main:responsive-web/client-web/main.js"]),
        "main()"
    );

    let second = publisher(&remote, &tmp.path().join("clone-2"));
    assert_eq!(
        second.published_file("sw.js").await.unwrap().as_deref(),
        Some(&b"self.ASSETS = [];\n"[..])
    );
    assert_eq!(
        second.publish(&staged, "Web build: 0123456").await.unwrap(),
        PublishOutcome::Unchanged
    );
    assert_eq!(git(remote_dir, &["rev-list", "--count", "main"]), "1");
}

#[tokio::test]
async fn changed_tree_is_committed_on_top_and_stale_files_removed() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let remote = bare_remote(tmp.path());

    let v1 = tmp.path().join("v1");
    stage(&v1, &[("index.html", "one\n"), ("old.js", "gone\n")]);
    publisher(&remote, &tmp.path().join("clone-1"))
        .publish(&v1, "Web build: 1111111")
        .await
        .unwrap();

    let v2 = tmp.path().join("v2");
    stage(&v2, &[("index.html", "two\n")]);
    let outcome = publisher(&remote, &tmp.path().join("clone-2"))
        .publish(&v2, "Web build: 2222222")
        .await
        .unwrap();
    assert!(matches!(outcome, PublishOutcome::Published { .. }));

    let remote_dir = Path::new(&remote);
    assert_eq!(git(remote_dir, &["rev-list", "--count", "main"]), "2");
    assert_eq!(git(remote_dir, &["ls-tree", "--name-only", "main"]), "index.html");
}

#[tokio::test]
async fn push_can_be_disabled() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let remote = bare_remote(tmp.path());
    let staged = tmp.path().join("stage");
    stage(&staged, &[("index.html", "local only\n")]);

    let config = GitPublisherConfig {
        remote: remote.clone(),
        branch: "main".into(),
        workdir: tmp.path().join("clone"),
        author_name: "Mirror Bot".into(),
        author_email: "mirror@example.com".into(),
        token: None,
        push: false,
    };
    let outcome = GitPublisher::new(config).publish(&staged, "Web build").await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Published { revision: Some(_) }));

    let heads = git(Path::new(&remote), &["for-each-ref", "refs/heads"]);
    assert!(heads.is_empty(), "nothing should reach the remote");
}
