use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const ITEMS: &str = "id\tname\nA\talpha\nB\tbeta\nC\tgamma\n";
const FILTER: &str = "id\tcolor\nB\tblue\n";

#[test]
fn help_lists_subcommands() {
    cargo_bin_cmd!("kgtkit")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ifexists"))
        .stdout(predicate::str::contains("ifnotexists"))
        .stdout(predicate::str::contains("join"))
        .stdout(predicate::str::contains("ifempty"));
}

#[test]
fn verbose_quiet_conflict() {
    cargo_bin_cmd!("kgtkit")
        .args(["--verbose", "--quiet", "join", "a", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn ifnotexists_with_explicit_keys() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", ITEMS);
    let filter = write_file(&tmp, "filter.tsv", FILTER);
    let reject = tmp.path().join("reject.tsv");

    cargo_bin_cmd!("kgtkit")
        .arg("ifnotexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .args(["--input-keys", "id", "--filter-keys", "id"])
        .arg("--reject-file")
        .arg(&reject)
        .assert()
        .success()
        .stdout("id\tname\nA\talpha\nC\tgamma\n");

    assert_eq!(fs::read_to_string(&reject).unwrap(), "id\tname\nB\tbeta\n");
}

#[test]
fn ifexists_reads_input_from_stdin() {
    let tmp = TempDir::new().unwrap();
    let filter = write_file(&tmp, "filter.tsv", FILTER);

    cargo_bin_cmd!("kgtkit")
        .args(["ifexists", "-", "--filter-on"])
        .arg(&filter)
        .write_stdin(ITEMS)
        .assert()
        .success()
        .stdout("id\tname\nB\tbeta\n");
}

#[test]
fn ifexists_cache_input_preserves_order_and_partitions_filter() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", "id\tname\nC\tgamma\nA\talpha\nB\tbeta\n");
    let filter = write_file(&tmp, "filter.tsv", "ID\tcolor\nA\tred\nZ\tgrey\nC\tcyan\n");
    let matched = tmp.path().join("matched.tsv");
    let unmatched = tmp.path().join("unmatched.tsv");

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .args(["--cache-input", "--preserve-order"])
        .arg("--matched-filter-file")
        .arg(&matched)
        .arg("--unmatched-filter-file")
        .arg(&unmatched)
        .assert()
        .success()
        .stdout("id\tname\nC\tgamma\nA\talpha\n");

    assert_eq!(
        fs::read_to_string(&matched).unwrap(),
        "ID\tcolor\nA\tred\nC\tcyan\n"
    );
    assert_eq!(fs::read_to_string(&unmatched).unwrap(), "ID\tcolor\nZ\tgrey\n");
}

#[test]
fn ifexists_join_file_merges_matching_pairs() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", ITEMS);
    let filter = write_file(&tmp, "filter.tsv", FILTER);
    let joined = tmp.path().join("joined.tsv");

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .arg("--join-file")
        .arg(&joined)
        .arg("--left-join")
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&joined).unwrap(),
        "id\tname\tcolor\nA\talpha\t\nB\tbeta\tblue\nC\tgamma\t\n"
    );
}

#[test]
fn short_row_fails_unless_a_policy_is_given() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", "id\tname\nA\talpha\nB\nC\tgamma\n");
    let filter = write_file(&tmp, "filter.tsv", "id\nB\n");

    cargo_bin_cmd!("kgtkit")
        .arg("ifnotexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("kgtkit: "))
        .stderr(predicate::str::contains("line 3"));

    cargo_bin_cmd!("kgtkit")
        .arg("ifnotexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .args(["--short-rows", "fill"])
        .assert()
        .success()
        .stdout("id\tname\nA\talpha\nC\tgamma\n");

    cargo_bin_cmd!("kgtkit")
        .arg("ifnotexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .args(["--short-rows", "exclude"])
        .assert()
        .success()
        .stdout("id\tname\nA\talpha\nC\tgamma\n")
        .stderr(predicate::str::contains("excluding row"));
}

#[test]
fn join_file_with_clashing_columns_fails() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", ITEMS);
    let filter = write_file(&tmp, "filter.tsv", "id\tname\nB\tother\n");
    let joined = tmp.path().join("joined.tsv");

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .arg("--join-file")
        .arg(&joined)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'name'"));

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .arg("--join-file")
        .arg(&joined)
        .args(["--filter-prefix", "filter."])
        .assert()
        .success()
        .stdout("id\tname\nB\tbeta\n");

    assert_eq!(
        fs::read_to_string(&joined).unwrap(),
        "id\tname\tfilter.name\nB\tbeta\tother\n"
    );
}

#[test]
fn presorted_input_out_of_order_fails() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", "id\tname\n2\tb\n1\ta\n3\tc\n");
    let filter = write_file(&tmp, "filter.tsv", "id\n1\n2\n3\n");

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .arg("--presorted")
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("kgtkit: "))
        .stderr(predicate::str::contains("line 3"))
        .stderr(predicate::str::contains("1"));
}

#[test]
fn ifnotexists_has_no_presorted_flag() {
    cargo_bin_cmd!("kgtkit")
        .args(["ifnotexists", "a.tsv", "--filter-on", "b.tsv", "--presorted"])
        .assert()
        .code(2);
}

#[test]
fn both_inputs_on_stdin_is_a_config_error() {
    cargo_bin_cmd!("kgtkit")
        .args(["ifexists", "-", "--filter-on", "-"])
        .write_stdin(ITEMS)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("only one input"));
}

#[test]
fn key_count_mismatch_is_reported_before_output() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "items.tsv", ITEMS);
    let filter = write_file(&tmp, "filter.tsv", FILTER);

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(&input)
        .arg("--filter-on")
        .arg(&filter)
        .args(["--input-keys", "id", "name", "--filter-keys", "id"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("key column"));
}

#[test]
fn missing_input_file_fails_with_one_line() {
    let tmp = TempDir::new().unwrap();
    let filter = write_file(&tmp, "filter.tsv", FILTER);

    cargo_bin_cmd!("kgtkit")
        .arg("ifexists")
        .arg(tmp.path().join("missing.tsv"))
        .arg("--filter-on")
        .arg(&filter)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.tsv"))
        .stderr(predicate::function(|err: &str| err.lines().count() == 1));
}

#[test]
fn join_inner_on_node1() {
    let tmp = TempDir::new().unwrap();
    let left = write_file(&tmp, "left.tsv", "node1\tlabel\tnode2\nQ1\tP31\tQ5\n");
    let right = write_file(
        &tmp,
        "right.tsv",
        "node1\tlabel\tnode2\nQ1\tP31\tQ5\nQ2\tP31\tQ5\n",
    );

    cargo_bin_cmd!("kgtkit")
        .arg("join")
        .arg(&left)
        .arg(&right)
        .assert()
        .success()
        .stdout("node1\tlabel\tnode2\nQ1\tP31\tQ5\nQ1\tP31\tQ5\n");
}

#[test]
fn join_outer_reads_left_from_stdin() {
    let tmp = TempDir::new().unwrap();
    let right = write_file(&tmp, "right.tsv", "subject\tpredicate\tobject\nQ2\tP31\tQ5\n");

    cargo_bin_cmd!("kgtkit")
        .args(["join", "-"])
        .arg(&right)
        .args(["--left-join", "--right-join"])
        .write_stdin("node1\tlabel\tnode2\nQ1\tP31\tQ5\n")
        .assert()
        .success()
        .stdout("node1\tlabel\tnode2\nQ1\tP31\tQ5\nQ2\tP31\tQ5\n");
}

#[test]
fn join_edge_with_node_file_fails() {
    let tmp = TempDir::new().unwrap();
    let left = write_file(&tmp, "left.tsv", "node1\tlabel\tnode2\nQ1\tP31\tQ5\n");
    let right = write_file(&tmp, "right.tsv", ITEMS);

    cargo_bin_cmd!("kgtkit")
        .arg("join")
        .arg(&left)
        .arg(&right)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot join"));
}

#[test]
fn ifnotempty_with_reject_file() {
    let tmp = TempDir::new().unwrap();
    let input = write_file(&tmp, "edges.tsv", "node1\tlabel\tnode2\nQ1\tP31\t\nQ2\tP31\tQ5\n");
    let reject = tmp.path().join("reject.tsv");

    cargo_bin_cmd!("kgtkit")
        .arg("ifnotempty")
        .arg(&input)
        .args(["--columns", "object"])
        .arg("--reject-file")
        .arg(&reject)
        .assert()
        .success()
        .stdout("node1\tlabel\tnode2\nQ2\tP31\tQ5\n");

    assert_eq!(
        fs::read_to_string(&reject).unwrap(),
        "node1\tlabel\tnode2\nQ1\tP31\t\n"
    );
}
