//! Gitignore compatibility tests.

use bstr::BStr;
use git_ignore::IgnoreManager;

fn manager_from(content: &[u8]) -> IgnoreManager {
    let mut mgr = IgnoreManager::new();
    mgr.add_ignore_file("", content);
    mgr
}

#[test]
fn simple_wildcard() {
    let mgr = manager_from(b"*.o\n");
    assert!(mgr.is_ignored(BStr::new(b"test.o"), false));
    assert!(mgr.is_ignored(BStr::new(b"dir/test.o"), false));
    assert!(!mgr.is_ignored(BStr::new(b"test.c"), false));
}

#[test]
fn negation() {
    let mgr = manager_from(b"*.o\n!important.o\n");
    assert!(mgr.is_ignored(BStr::new(b"test.o"), false));
    assert!(!mgr.is_ignored(BStr::new(b"important.o"), false));
}

#[test]
fn directory_only() {
    let mgr = manager_from(b"build/\n");
    assert!(mgr.is_ignored(BStr::new(b"build"), true));
    assert!(!mgr.is_ignored(BStr::new(b"build"), false));
}

#[test]
fn anchored_pattern() {
    let mgr = manager_from(b"/TODO\n");
    assert!(mgr.is_ignored(BStr::new(b"TODO"), false));
}

#[test]
fn double_star() {
    let mgr = manager_from(b"**/foo\n");
    assert!(mgr.is_ignored(BStr::new(b"foo"), false));
    assert!(mgr.is_ignored(BStr::new(b"dir/foo"), false));
    assert!(mgr.is_ignored(BStr::new(b"dir/sub/foo"), false));
}

#[test]
fn double_star_slash() {
    let mgr = manager_from(b"**/foo/bar\n");
    assert!(mgr.is_ignored(BStr::new(b"foo/bar"), false));
    assert!(mgr.is_ignored(BStr::new(b"dir/foo/bar"), false));
}

#[test]
fn trailing_double_star() {
    let mgr = manager_from(b"abc/**\n");
    assert!(mgr.is_ignored(BStr::new(b"abc/x"), false));
    assert!(mgr.is_ignored(BStr::new(b"abc/x/y"), false));
    assert!(!mgr.is_ignored(BStr::new(b"other/x"), false));
}

#[test]
fn comment_and_empty_lines() {
    let mgr = manager_from(b"# This is a comment\n\n*.o\n");
    assert!(mgr.is_ignored(BStr::new(b"test.o"), false));
    assert!(!mgr.is_ignored(BStr::new(b"test.c"), false));
}

#[test]
fn escaped_hash() {
    let mgr = manager_from(b"\\#important\n");
    assert!(mgr.is_ignored(BStr::new(b"#important"), false));
}

#[test]
fn character_class() {
    let mgr = manager_from(b"*.[oa]\n");
    assert!(mgr.is_ignored(BStr::new(b"test.o"), false));
    assert!(mgr.is_ignored(BStr::new(b"test.a"), false));
    assert!(!mgr.is_ignored(BStr::new(b"test.c"), false));
}

#[test]
fn multiple_patterns() {
    let mgr = manager_from(b"*.o\n*.a\n*.so\n!libkeep.so\n");
    assert!(mgr.is_ignored(BStr::new(b"test.o"), false));
    assert!(mgr.is_ignored(BStr::new(b"test.a"), false));
    assert!(mgr.is_ignored(BStr::new(b"test.so"), false));
    assert!(!mgr.is_ignored(BStr::new(b"libkeep.so"), false));
    assert!(!mgr.is_ignored(BStr::new(b"test.c"), false));
}

#[test]
fn path_with_slash() {
    let mgr = manager_from(b"doc/frotz/\n");
    assert!(mgr.is_ignored(BStr::new(b"doc/frotz"), true));
    assert!(!mgr.is_ignored(BStr::new(b"doc/frotz"), false));
}

#[test]
fn not_ignored_by_default() {
    let mgr = manager_from(b"*.o\n");
    assert!(!mgr.is_ignored(BStr::new(b"Makefile"), false));
    assert!(!mgr.is_ignored(BStr::new(b"src/main.rs"), false));
}
