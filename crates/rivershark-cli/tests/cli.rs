use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use rivershark_test_utils::{write_plain_jar, BundleJar};

fn rivershark() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rivershark"));
    cmd.env_remove("RIVERSHARK_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_mentions_core_commands() {
    rivershark().arg("--help").assert().success().stdout(
        predicate::str::contains("install-bundles")
            .and(predicate::str::contains("rebuild-index"))
            .and(predicate::str::contains("list")),
    );
}

#[test]
fn install_bundles_then_list_json() {
    let temp = TempDir::new().unwrap();
    let repo = temp.child("repo");
    let widget = BundleJar::new("com.example.widget", "1.2.0")
        .write_to(temp.child("in/widget.jar").path());
    let gadget = BundleJar::new("com.example.gadget", "0.9.1.beta")
        .write_to(temp.child("in/gadget.jar").path());

    rivershark()
        .arg("install-bundles")
        .arg("--repository")
        .arg(repo.path())
        .arg("--file")
        .arg(&widget)
        .arg("--file")
        .arg(&gadget)
        .assert()
        .success()
        .stdout(predicate::str::contains("indexed: 2 resource(s)"));

    repo.child("bundles/com.example.widget-1.2.0.jar")
        .assert(predicate::path::is_file());
    repo.child("bundles/com.example.gadget-0.9.1.beta.jar")
        .assert(predicate::path::is_file());
    repo.child("obr.xml").assert(predicate::str::contains("osgi.identity"));

    let output = rivershark()
        .arg("list")
        .arg("--repository")
        .arg(repo.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["name"], "Rivershark");
    let resources = v["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0]["symbolic_name"], "com.example.gadget");
    assert_eq!(resources[0]["version"], "0.9.1.beta");
    assert_eq!(resources[1]["symbolic_name"], "com.example.widget");
    assert_eq!(
        resources[1]["url"],
        "bundles/com.example.widget-1.2.0.jar"
    );
}

#[test]
fn invalid_bundle_exits_with_one_and_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let repo = temp.child("repo");
    let widget = BundleJar::new("com.example.widget", "1.2.0")
        .write_to(temp.child("in/widget.jar").path());
    let plain = write_plain_jar(temp.child("plain.jar").path(), &[("a.txt", b"a")]);

    rivershark()
        .arg("install-bundles")
        .arg("--repository")
        .arg(repo.path())
        .arg(&widget)
        .arg(&plain)
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("missing identity/version")
                .and(predicate::str::contains("plain.jar")),
        );

    repo.child("bundles/com.example.widget-1.2.0.jar")
        .assert(predicate::path::missing());
    repo.child("obr.xml").assert(predicate::path::missing());
}

#[test]
fn config_file_supplies_repository_and_name() {
    let temp = TempDir::new().unwrap();
    temp.child("rivershark.toml")
        .write_str(
            r#"
[repository]
directory = "shared-obr"
name = "Team Bundles"

[logging]
level = "warn"
"#,
        )
        .unwrap();
    let widget = BundleJar::new("com.example.widget", "1.2.0")
        .write_to(temp.child("widget.jar").path());

    rivershark()
        .env("RIVERSHARK_CONFIG", temp.child("rivershark.toml").path())
        .arg("install-bundles")
        .arg(&widget)
        .assert()
        .success();

    temp.child("shared-obr/obr.xml")
        .assert(predicate::str::contains(r#"name="Team Bundles""#));

    rivershark()
        .arg("--config")
        .arg(temp.child("rivershark.toml").path())
        .arg("list")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("repository: Team Bundles")
                .and(predicate::str::contains("com.example.widget 1.2.0")),
        );
}

#[test]
fn rebuild_index_picks_up_manually_placed_bundles() {
    let temp = TempDir::new().unwrap();
    let repo = temp.child("repo");
    BundleJar::new("com.example.manual", "2.0.0")
        .write_to(repo.child("bundles/manual.jar").path());

    rivershark()
        .arg("rebuild-index")
        .arg("--repository")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("indexed: 1 resource(s)"));

    repo.child("obr.xml")
        .assert(predicate::str::contains("bundles/manual.jar"));
}

#[test]
fn missing_repository_directory_is_an_error() {
    rivershark()
        .arg("rebuild-index")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no repository directory configured"));
}

#[test]
fn install_without_files_is_an_error() {
    let temp = TempDir::new().unwrap();
    rivershark()
        .arg("install-bundles")
        .arg("--repository")
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no bundles given"));
}

#[test]
fn list_before_any_install_reports_no_index() {
    let temp = TempDir::new().unwrap();
    rivershark()
        .arg("list")
        .arg("--repository")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("no index at"));
}

#[test]
fn concurrent_processes_install_into_one_repository() {
    let temp = TempDir::new().unwrap();
    let repo = temp.child("repo");
    let names: Vec<String> = (0..4).map(|idx| format!("com.example.proc{idx}")).collect();

    let children: Vec<_> = names
        .iter()
        .map(|name| {
            let jar = BundleJar::new(name, "1.0.0")
                .write_to(temp.child(format!("in/{name}.jar")).path());
            std::process::Command::new(assert_cmd::cargo::cargo_bin!("rivershark"))
                .env_remove("RIVERSHARK_CONFIG")
                .env_remove("RUST_LOG")
                .arg("install-bundles")
                .arg("--repository")
                .arg(repo.path())
                .arg("--file")
                .arg(&jar)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let output = rivershark()
        .arg("list")
        .arg("--repository")
        .arg(repo.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let indexed: Vec<_> = v["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|resource| resource["symbolic_name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(indexed, names);
}
