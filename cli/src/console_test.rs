use super::*;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stimulus-cli-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn artifact_is_written_into_out_dir() {
    let dir = scratch_dir("write");
    let ui = ConsoleUi::new(&dir);

    ui.deliver_artifact("stimuli_s1.csv", b"id\n1\n").unwrap();
    let path = dir.join("stimuli_s1.csv");
    assert_eq!(std::fs::read(&path).unwrap(), b"id\n1\n");
    assert_eq!(ui.saved(), vec![path]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn artifact_name_cannot_escape_out_dir() {
    let dir = scratch_dir("escape");
    let ui = ConsoleUi::new(&dir);

    assert_eq!(ui.artifact_path("../../etc/stimuli_s1.csv").unwrap(), dir.join("stimuli_s1.csv"));
    assert!(ui.artifact_path("..").is_err());
}
