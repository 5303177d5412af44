use assert_cmd::Command;
use predicates::prelude::*;

fn cast() -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("cast")?;
    cmd.env_remove("CAST_VAULT")
        .env_remove("CAST_CONFIG")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn create_then_read_prints_envelopes() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config = temp.path().join("cast.toml");
    std::fs::write(&config, "content_search = \"regex\"\n")?;
    let vault = temp.path().join("vault");
    std::fs::create_dir_all(&vault)?;

    cast()?
        .arg("--vault")
        .arg(&vault)
        .arg("--config")
        .arg(&config)
        .args(["create", "Project Plan", "--content", "Ship it", "--dep", "Team Charter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": true"));
    assert!(vault.join("Project Plan.md").is_file());

    cast()?
        .env("CAST_VAULT", &vault)
        .args(["read", "Project Plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Team Charter\""))
        .stdout(predicate::str::contains("\"content\": \"Ship it\""));

    cast()?
        .env("CAST_VAULT", &vault)
        .args(["validate", "Project Plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"issues\": []"));
    Ok(())
}

#[test]
fn failures_exit_non_zero_with_error_kind() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;

    cast()?
        .arg("--vault")
        .arg(temp.path())
        .args(["read", "Missing"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"ok\": false"))
        .stdout(predicate::str::contains("\"kind\": \"not_found\""));
    Ok(())
}

#[test]
fn diff_text_needs_no_vault() -> anyhow::Result<()> {
    cast()?
        .args(["diff-text", "a\n", "b\n", "--a-label", "old", "--b-label", "new"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@@ -1 +1 @@"));
    Ok(())
}

#[test]
fn vault_is_required_for_vault_commands() -> anyhow::Result<()> {
    cast()?
        .args(["titles", "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--vault is required"));
    Ok(())
}
