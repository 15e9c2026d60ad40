//! E2E CLI tests covering:
//! - `mp init` bootstrapping and refusal before init
//! - project creation with and without an acting user
//! - membership, reassignment (applied and refused), and access gates
//! - tickets, tag counts, milestones, events, and destroy
//! - text versus pretty rendering
//!
//! Each test runs `mp` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the `mp` binary, rooted in `dir`, with the user
/// config pointed into the temp dir.
fn mp_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mp"));
    cmd.current_dir(dir);
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env("MILEPOST_LOG", "error");
    cmd.env_remove("MILEPOST_USER");
    cmd.env_remove("MILEPOST_FORMAT");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = mp_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("mp should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// Initialize a store with users ada and bob and a project apollo owned by ada.
fn setup() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    mp_cmd(root).args(["init", "--user", "ada"]).assert().success();
    mp_cmd(root).args(["user", "add", "bob"]).assert().success();
    mp_cmd(root)
        .args(["--as", "ada", "project", "create", "apollo"])
        .assert()
        .success();
    dir
}

/// Replace the project config so that only `root` is a global admin.
fn restrict_global_admins(root: &Path) {
    std::fs::write(
        root.join(".milepost/config.toml"),
        "[access]\nglobal_admins = [\"root\"]\n",
    )
    .expect("write config");
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[test]
fn commands_before_init_are_refused() {
    let dir = TempDir::new().expect("temp dir");
    mp_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"))
        .stderr(predicate::str::contains("mp init"));
}

#[test]
fn init_seeds_default_roles_and_refuses_rerun() {
    let dir = TempDir::new().expect("temp dir");
    let json = run_json(dir.path(), &["init"]);
    assert_eq!(json["admin_function"]["name"], "Admin");
    assert_eq!(json["admin_function"]["is_admin"], true);
    assert_eq!(json["member_function"]["name"], "Member");
    assert!(dir.path().join(".milepost/config.toml").exists());
    assert_eq!(json["global_admins"], serde_json::json!([]));

    mp_cmd(dir.path()).args(["init"]).assert().failure();
    mp_cmd(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();

    let roles = run_json(dir.path(), &["function", "list"]);
    assert_eq!(roles.as_array().map(Vec::len), Some(2));
}

#[test]
fn role_registry_edits_need_a_global_admin() {
    let dir = setup();
    let owner = run_json(dir.path(), &["--as", "ada", "function", "add", "Owner"]);
    assert_eq!(owner["is_admin"], false);

    let flags = run_json(dir.path(), &["--as", "ada", "function", "set-admin", "Owner"]);
    assert_eq!(flags["changed"], 2);

    let roles = run_json(dir.path(), &["function", "list"]);
    let admins: Vec<&str> = roles
        .as_array()
        .expect("roles")
        .iter()
        .filter(|role| role["is_admin"] == true)
        .filter_map(|role| role["name"].as_str())
        .collect();
    assert_eq!(admins, ["Owner"]);

    restrict_global_admins(dir.path());
    mp_cmd(dir.path())
        .args(["--as", "ada", "function", "add", "Guest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
    mp_cmd(dir.path())
        .args(["function", "add", "Guest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[test]
fn created_project_has_founder_as_admin() {
    let dir = setup();
    let json = run_json(dir.path(), &["project", "show", "apollo"]);

    let members = json["project"]["members"].as_array().expect("members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["user_name"], "ada");
    assert_eq!(members[0]["function_name"], "Admin");
    assert_eq!(members[0]["is_admin"], true);
    assert_eq!(json["latest_event"]["event_type"], "created");
}

#[test]
fn project_create_without_actor_fails() {
    let dir = setup();
    mp_cmd(dir.path())
        .args(["project", "create", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));

    let projects = run_json(dir.path(), &["project", "list"]);
    assert_eq!(projects.as_array().map(Vec::len), Some(1));
}

#[test]
fn duplicate_project_name_reports_field_errors() {
    let dir = setup();
    let output = mp_cmd(dir.path())
        .args(["--as", "bob", "project", "create", "apollo", "--json"])
        .output()
        .expect("run");
    assert!(!output.status.success());

    let err: Value = serde_json::from_slice(&output.stderr).expect("json error");
    assert_eq!(err["error"]["error_code"], "E2001");
    assert_eq!(err["error"]["fields"]["name"][0], "has already been taken");
}

#[test]
fn update_is_logged_and_gated() {
    let dir = setup();
    mp_cmd(dir.path())
        .args(["--as", "bob", "project", "update", "apollo", "--name", "artemis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));

    run_json(
        dir.path(),
        &["--as", "ada", "project", "update", "apollo", "-d", "to the moon"],
    );
    let events = run_json(dir.path(), &["events", "apollo"]);
    let events = events.as_array().expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "updated");
    assert_eq!(events[1]["event_type"], "created");
}

#[test]
fn init_user_becomes_the_only_global_admin() {
    let dir = TempDir::new().expect("temp dir");
    let json = run_json(dir.path(), &["init", "--user", "ada"]);
    assert_eq!(json["global_admins"], serde_json::json!(["ada"]));

    let config =
        std::fs::read_to_string(dir.path().join(".milepost/config.toml")).expect("read config");
    assert!(config.contains("[access]"));
    assert!(config.contains("\"ada\""));
}

#[test]
fn default_config_refuses_non_admins() {
    let dir = setup();
    mp_cmd(dir.path()).args(["user", "add", "cy"]).assert().success();
    run_json(dir.path(), &["--as", "ada", "member", "add", "apollo", "cy"]);

    // bob is no member; cy is a plain member
    for login in ["bob", "cy"] {
        for args in [
            vec!["project", "destroy", "apollo"],
            vec!["project", "update", "apollo", "--name", "artemis"],
            vec!["member", "add", "apollo", "bob"],
            vec!["member", "reassign", "apollo", "1=Member", "2=Admin"],
            vec!["milestone", "add", "apollo", "v1"],
            vec!["function", "add", "Guest"],
        ] {
            mp_cmd(dir.path())
                .args(["--as", login])
                .args(&args)
                .assert()
                .failure()
                .stderr(predicate::str::contains("E2003"));
        }
    }

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    assert_eq!(json["project"]["name"], "apollo");
    assert_eq!(json["project"]["members"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["project"]["members"][0]["is_admin"], true);
}

#[test]
fn numeric_project_names_resolve_by_name() {
    let dir = setup();
    run_json(dir.path(), &["--as", "ada", "project", "create", "2024"]);

    let by_name = run_json(dir.path(), &["project", "show", "2024"]);
    assert_eq!(by_name["project"]["name"], "2024");
    let by_id = run_json(dir.path(), &["project", "show", "1"]);
    assert_eq!(by_id["project"]["name"], "apollo");
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn member_add_is_idempotent() {
    let dir = setup();
    let first = run_json(dir.path(), &["--as", "ada", "member", "add", "apollo", "bob"]);
    assert_eq!(first["added"], true);
    assert_eq!(first["function"], "Member");

    let second = run_json(dir.path(), &["--as", "ada", "member", "add", "apollo", "bob"]);
    assert_eq!(second["added"], false);

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    assert_eq!(json["project"]["members"].as_array().map(Vec::len), Some(2));
}

#[test]
fn reassignment_hands_over_admin() {
    let dir = setup();
    run_json(dir.path(), &["--as", "ada", "member", "add", "apollo", "bob"]);

    let outcome = run_json(
        dir.path(),
        &["--as", "ada", "member", "reassign", "apollo", "1=Member", "2=Admin"],
    );
    assert_eq!(outcome["status"], "applied");

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    let members = json["project"]["members"].as_array().expect("members");
    assert_eq!(members[0]["is_admin"], false);
    assert_eq!(members[1]["is_admin"], true);
}

#[test]
fn repeated_member_in_reassignment_is_refused() {
    let dir = setup();
    run_json(dir.path(), &["--as", "ada", "member", "add", "apollo", "bob"]);

    mp_cmd(dir.path())
        .args(["--as", "ada", "member", "reassign", "apollo", "2=Admin", "2=Member"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("assigned twice"));

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    assert_eq!(json["project"]["members"][1]["function_name"], "Member");
}

#[test]
fn reassignment_without_admin_target_is_refused() {
    let dir = setup();
    let output = mp_cmd(dir.path())
        .args(["--as", "ada", "member", "reassign", "apollo", "1=Member", "--json"])
        .output()
        .expect("run");
    assert!(!output.status.success());

    let outcome: Value = serde_json::from_slice(&output.stdout).expect("outcome json");
    assert_eq!(outcome["status"], "rejected");
    assert_eq!(outcome["rejection"]["reason"], "no_admin_function");
    assert!(String::from_utf8_lossy(&output.stderr).contains("E2004"));

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    assert_eq!(json["project"]["members"][0]["function_name"], "Admin");
}

// ---------------------------------------------------------------------------
// Tickets, milestones, destroy
// ---------------------------------------------------------------------------

#[test]
fn tickets_number_and_tags_count() {
    let dir = setup();
    let first = run_json(
        dir.path(),
        &["ticket", "add", "apollo", "Launch", "--tag", "foo", "--tag", "bar"],
    );
    let second = run_json(dir.path(), &["ticket", "add", "apollo", "Land", "-t", "foo"]);
    assert_eq!(first["number"], 1);
    assert_eq!(second["number"], 2);

    let counts = run_json(dir.path(), &["tags", "recompute", "apollo"]);
    assert_eq!(counts["foo"], 2);
    assert_eq!(counts["bar"], 1);

    let ticket_id = first["id"].as_i64().expect("ticket id").to_string();
    run_json(dir.path(), &["ticket", "tag", &ticket_id, "baz"]);
    let counts = run_json(dir.path(), &["tags", "show", "apollo"]);
    assert_eq!(counts, serde_json::json!({ "baz": 1, "foo": 1 }));

    let json = run_json(dir.path(), &["project", "show", "apollo"]);
    assert_eq!(json["project"]["num_ticket"], 3);
}

#[test]
fn milestones_classify_around_given_date() {
    let dir = setup();
    for (name, due) in [
        ("v0", "2030-01-01"),
        ("v1", "2030-02-01"),
        ("v2", "2030-03-01"),
    ] {
        run_json(
            dir.path(),
            &["--as", "ada", "milestone", "add", "apollo", name, "--due", due],
        );
    }
    run_json(dir.path(), &["--as", "ada", "milestone", "add", "apollo", "someday"]);

    let plan = run_json(
        dir.path(),
        &["milestone", "list", "apollo", "--at", "2030-01-15"],
    );
    assert_eq!(plan["current"]["name"], "v1");
    assert_eq!(plan["upcoming"][0]["name"], "v2");
    assert_eq!(plan["outdated"][0]["name"], "v0");
    assert_eq!(plan["no_date"][0]["name"], "someday");
}

#[test]
fn destroy_removes_everything() {
    let dir = setup();
    run_json(dir.path(), &["ticket", "add", "apollo", "Launch", "--tag", "foo"]);
    run_json(dir.path(), &["--as", "ada", "milestone", "add", "apollo", "v1"]);

    mp_cmd(dir.path())
        .args(["--as", "bob", "project", "destroy", "apollo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));

    let report = run_json(dir.path(), &["--as", "ada", "project", "destroy", "apollo"]);
    assert_eq!(report["removed"]["tickets"], 1);
    assert_eq!(report["removed"]["milestones"], 1);
    assert_eq!(report["removed"]["members"], 1);
    assert_eq!(report["removed"]["events"], 1);

    let projects = run_json(dir.path(), &["project", "list"]);
    assert_eq!(projects.as_array().map(Vec::len), Some(0));
}

// ---------------------------------------------------------------------------
// Output modes
// ---------------------------------------------------------------------------

#[test]
fn piped_output_is_tab_separated_text() {
    let dir = setup();
    run_json(dir.path(), &["ticket", "add", "apollo", "Launch", "-t", "foo", "-t", "bar"]);

    mp_cmd(dir.path())
        .args(["tags", "show", "apollo"])
        .assert()
        .success()
        .stdout("bar\t1\nfoo\t1\n");

    mp_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .success()
        .stdout("1\tapollo\t1\n");
}

#[test]
fn pretty_output_has_headings() {
    let dir = setup();
    run_json(dir.path(), &["ticket", "add", "apollo", "Launch", "-t", "foo"]);

    mp_cmd(dir.path())
        .env("MILEPOST_FORMAT", "pretty")
        .args(["tags", "show", "apollo"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("TAG"))
        .stdout(predicate::str::contains("-------"));

    mp_cmd(dir.path())
        .env("MILEPOST_FORMAT", "pretty")
        .args(["project", "show", "apollo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Members"))
        .stdout(predicate::str::contains("(admin)"));
}
