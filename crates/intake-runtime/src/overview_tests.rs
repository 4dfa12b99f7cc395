//! Unit tests for overview extraction.

use super::*;

#[test]
fn local_repo_path_strips_scheme_and_trailing_slash() {
    assert_eq!(
        local_repo_path("file:///srv/repos/payroll/"),
        Some(PathBuf::from("/srv/repos/payroll"))
    );
    assert_eq!(
        local_repo_path("file:///srv/repos/payroll"),
        Some(PathBuf::from("/srv/repos/payroll"))
    );
}

#[test]
fn local_repo_path_ignores_other_schemes() {
    assert_eq!(local_repo_path("https://github.com/acme/payroll"), None);
    assert_eq!(local_repo_path("/srv/repos/payroll"), None);
}

#[tokio::test]
async fn reads_overview_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let content = "# Payroll\n\nRuns monthly payroll.\n";
    std::fs::write(dir.path().join(OVERVIEW_FILE), content).expect("write");

    let repo = format!("file://{}/", dir.path().display());
    assert_eq!(extract_overview(&repo).await.expect("extract"), content);
}

#[tokio::test]
async fn missing_overview_yields_sentinel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = format!("file://{}", dir.path().display());
    assert_eq!(extract_overview(&repo).await.expect("extract"), OVERVIEW_MISSING);
}

#[tokio::test]
async fn remote_repo_yields_empty_string() {
    let overview = extract_overview("https://github.com/acme/payroll")
        .await
        .expect("extract");
    assert!(overview.is_empty());
}

#[tokio::test]
async fn invalid_utf8_overview_is_read_lossily() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(OVERVIEW_FILE), b"caf\xe9 service\n").expect("write");

    let repo = format!("file://{}", dir.path().display());
    let overview = extract_overview(&repo).await.expect("extract");
    assert_eq!(overview, "caf\u{fffd} service\n");
}
