mod common;

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use common::{sha256, write_png};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($conf_dir:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin("imarchive")?;
            cmd.env_remove("EMBEDDING_API_URL").env_remove("EMBEDDING_MODEL");
            cmd.arg("-c").arg($conf_dir);
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

struct Workspace {
    conf_dir: TempDir,
    images: TempDir,
}

#[fixture]
fn workspace() -> Workspace {
    let conf_dir = TempDir::new().unwrap();
    let images = TempDir::new().unwrap();
    write_png(images.path(), "a.png", 1);
    write_png(images.path(), "sub/b.png", 2);

    let config = format!("paths = ['{}']\n", images.path().display());
    std::fs::write(conf_dir.path().join("config.toml"), config).unwrap();
    Workspace { conf_dir, images }
}

fn conf(ws: &Workspace) -> &Path {
    ws.conf_dir.path()
}

#[test]
fn init_creates_files() -> Result<()> {
    let conf_dir = TempDir::new()?;

    cargo_run!(conf_dir.path(), "init").success().stdout(predicate::str::contains("(TOML)"));

    assert!(conf_dir.path().join("config.toml").exists());
    assert!(conf_dir.path().join("images.db").exists());
    assert!(conf_dir.path().join("embeddings.db").exists());
    Ok(())
}

#[rstest]
fn check_reports_issues(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "check")
        .code(1)
        .stdout(predicate::str::contains("Images on disk not in hash DB: 2"));
    Ok(())
}

#[rstest]
fn check_without_config() -> Result<()> {
    let conf_dir = TempDir::new()?;
    cargo_run!(conf_dir.path(), "check").failure().stderr(predicate::str::contains("配置"));
    Ok(())
}

#[rstest]
fn check_with_yaml_config() -> Result<()> {
    let conf_dir = TempDir::new()?;
    std::fs::write(conf_dir.path().join("config.yaml"), "paths:\n  - /images\n")?;
    cargo_run!(conf_dir.path(), "check").failure().stderr(predicate::str::contains("TOML"));
    Ok(())
}

#[rstest]
fn dry_run_then_sync(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "sync", "--mock", "--dry-run")
        .success()
        .stdout(predicate::str::contains("DRY RUN").and(predicate::str::contains("New images added: 2")));

    // dry run 不会写入任何数据
    cargo_run!(conf(&workspace), "check").code(1);

    cargo_run!(conf(&workspace), "sync", "--mock")
        .success()
        .stdout(predicate::str::contains("Embeddings computed: 2"));
    cargo_run!(conf(&workspace), "check")
        .success()
        .stdout(predicate::str::contains("All databases are consistent"));
    cargo_run!(conf(&workspace), "sync", "--mock").success().stdout(predicate::str::contains("No changes"));
    Ok(())
}

#[rstest]
fn sync_requires_confirmation(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "sync", "--mock").success();
    std::fs::remove_file(workspace.images.path().join("a.png"))?;

    // stdin 不是终端，无法确认删除
    cargo_run!(conf(&workspace), "sync", "--mock")
        .code(1)
        .stdout(predicate::str::contains("Removals not confirmed: 1"));
    cargo_run!(conf(&workspace), "check").code(1);

    cargo_run!(conf(&workspace), "sync", "--mock", "--yes")
        .success()
        .stdout(predicate::str::contains("Images removed: 1"));
    cargo_run!(conf(&workspace), "check").success();
    Ok(())
}

#[rstest]
fn sync_without_provider(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "sync").failure().stderr(predicate::str::contains("EMBEDDING_API_URL"));
    Ok(())
}

#[rstest]
fn find_and_similar(workspace: Workspace) -> Result<()> {
    let a = sha256(workspace.images.path().join("a.png"));
    let b = sha256(workspace.images.path().join("sub/b.png"));

    cargo_run!(conf(&workspace), "sync", "--mock").success();
    cargo_run!(conf(&workspace), "index", workspace.images.path(), "--relative").success();

    cargo_run!(conf(&workspace), "find", &a[..8])
        .success()
        .stdout(predicate::str::contains(a.as_str()).and(predicate::str::contains("a.png")));
    cargo_run!(conf(&workspace), "find", "--output-format", "json", &a[..8])
        .success()
        .stdout(predicate::str::contains("\"mimetype\": \"image/png\""));

    cargo_run!(conf(&workspace), "similar", &a[..12])
        .success()
        .stdout(predicate::str::contains(b.as_str()).and(predicate::str::contains(a.as_str()).not()));
    Ok(())
}

#[rstest]
fn status_and_models(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "sync", "--mock", "-m", "mock-8").success();

    cargo_run!(conf(&workspace), "status")
        .success()
        .stdout(predicate::str::contains("Images in metadata DB: 2").and(predicate::str::contains("Model 'mock-8'")));
    cargo_run!(conf(&workspace), "models", "--mock")
        .success()
        .stdout(predicate::str::contains("healthy").and(predicate::str::contains("mock-8\t2")));
    Ok(())
}

#[rstest]
fn hash_algorithm_mismatch(workspace: Workspace) -> Result<()> {
    cargo_run!(conf(&workspace), "sync", "--mock").success();
    cargo_run!(conf(&workspace), "-H", "blake3", "sync", "--mock").failure();
    Ok(())
}

#[rstest]
fn export_embeddings(workspace: Workspace) -> Result<()> {
    let a = sha256(workspace.images.path().join("a.png"));
    cargo_run!(conf(&workspace), "sync", "--mock", "-m", "mock-8").success();
    cargo_run!(conf(&workspace), "index", workspace.images.path()).success();

    let output = workspace.conf_dir.path().join("out/export.json");
    cargo_run!(conf(&workspace), "export", "-m", "mock-8", "-o", &output).success();

    let data: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
    assert_eq!(data["model"], "mock-8");
    assert_eq!(data["count"], 2);
    let points = data["points"].as_array().unwrap();
    let point = points.iter().find(|p| p["hash"] == a.as_str()).unwrap();
    assert!(point["filepath"].as_str().unwrap().ends_with("a.png"));
    assert_eq!(point["mimetype"], "image/png");
    assert_eq!(point["width"], 4);
    assert_eq!(point["vector"].as_array().unwrap().len(), 512);

    cargo_run!(conf(&workspace), "export", "-m", "missing")
        .success()
        .stdout(predicate::str::contains("\"count\": 0"));
    Ok(())
}
