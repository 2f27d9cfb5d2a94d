//! Registry edge behaviour that needs no live kernel stream.

use dirsentry_core::{get_events, stop, Event};

#[test]
fn stopping_an_unknown_id_is_false() {
    assert!(!stop(42));
}

#[test]
fn stopping_the_same_unknown_id_twice_is_still_false() {
    assert!(!stop(99_999));
    assert!(!stop(99_999));
}

#[test]
fn getting_events_for_an_unknown_id_is_negative() {
    let mut out: Vec<Event> = Vec::new();
    assert_eq!(get_events(7_777, &mut out), -1);
    assert!(out.is_empty());
}

#[cfg(windows)]
#[test]
fn starting_on_a_missing_folder_is_refused() {
    use dirsentry_core::{start, WatchError, WatchRequest};

    let request = WatchRequest::new("c:\\definitely\\does\\not\\exist\\here", false);
    match start(request) {
        Err(WatchError::FolderNotFound(path)) => assert!(path.contains("does")),
        other => panic!("expected FolderNotFound, got {other:?}"),
    }
}

#[cfg(not(windows))]
#[test]
fn starting_without_kernel_support_is_refused() {
    use dirsentry_core::{start, WatchError, WatchRequest};

    let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
    let request = WatchRequest::new(tmp.path().to_string_lossy().into_owned(), false);
    assert!(matches!(start(request), Err(WatchError::Unsupported)));
}
