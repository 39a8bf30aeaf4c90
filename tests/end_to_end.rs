mod common;

use common::{write_faces, PixelFaces, ALICE, ALICE_AGAIN, BOB};
use facefind::{FaceFindError, MatchEngine, MatchPolicy, ReportDriver, SkipList};
use std::fs;

#[test]
fn finds_matching_images_and_ignores_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.jpg");
    let target = dir.path().join("images");
    write_faces(&base, &[ALICE]);
    write_faces(&target.join("a.jpg"), &[ALICE_AGAIN]);
    write_faces(&target.join("b.jpg"), &[BOB]);
    fs::write(target.join("c.txt"), "not an image").unwrap();
    write_faces(&target.join("d/alice.jpg"), &[ALICE]);

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let skip: SkipList = ["d"].into_iter().collect();
    let report = driver.run(&base, &target, &skip).unwrap();

    assert_eq!(report.reference_faces, 1);
    assert_eq!(report.verdicts.len(), 2);

    let a = &report.verdicts[0];
    assert_eq!(a.key, 1);
    assert!(a.path.ends_with("a.jpg"));
    assert!(a.matched);

    let b = &report.verdicts[1];
    assert_eq!(b.key, 2);
    assert!(b.path.ends_with("b.jpg"));
    assert!(!b.matched);

    assert_eq!(report.matches().count(), 1);
    // base image + a.jpg + b.jpg
    assert_eq!(driver.extractor().model().calls, 3);
}

#[test]
fn base_without_face_aborts_before_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.jpg");
    let target = dir.path().join("images");
    write_faces(&base, &[]);
    write_faces(&target.join("a.jpg"), &[ALICE]);

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let err = driver.run(&base, &target, &SkipList::new()).unwrap_err();

    assert!(matches!(err, FaceFindError::NoFaceInReference(_)));
    assert_eq!(driver.extractor().model().calls, 1);
}

#[test]
fn unreadable_base_counts_as_no_face() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("images");
    fs::create_dir_all(&target).unwrap();

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let err = driver
        .run(&dir.path().join("missing.jpg"), &target, &SkipList::new())
        .unwrap_err();
    assert!(matches!(err, FaceFindError::NoFaceInReference(_)));
}

#[test]
fn missing_target_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.jpg");
    write_faces(&base, &[ALICE]);

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let err = driver
        .run(&base, &dir.path().join("images"), &SkipList::new())
        .unwrap_err();
    assert!(matches!(err, FaceFindError::DirectoryNotFound(_)));
}

#[test]
fn multi_face_images_follow_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.png");
    let target = dir.path().join("images");
    // reference is the first face of the base image
    write_faces(&base, &[ALICE, BOB]);
    write_faces(&target.join("group.png"), &[BOB, ALICE_AGAIN]);

    let mut first_only = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let report = first_only.run(&base, &target, &SkipList::new()).unwrap();
    assert_eq!(report.reference_faces, 2);
    assert_eq!(report.policy, MatchPolicy::FirstFace);
    assert!(!report.verdicts[0].matched);
    assert_eq!(report.verdicts[0].faces, 2);

    let engine = MatchEngine::new(facefind::matcher::DEFAULT_TOLERANCE, MatchPolicy::AnyFace);
    let mut any = ReportDriver::new(PixelFaces::default(), engine);
    let report = any.run(&base, &target, &SkipList::new()).unwrap();
    assert!(report.verdicts[0].matched);
}

#[test]
fn repeated_runs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.jpg");
    let target = dir.path().join("images");
    write_faces(&base, &[ALICE]);
    for (name, face) in [("x/1.png", BOB), ("y/2.png", ALICE_AGAIN), ("3.jpg", ALICE)] {
        write_faces(&target.join(name), &[face]);
    }

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let first = driver.run(&base, &target, &SkipList::new()).unwrap();
    let second = driver.run(&base, &target, &SkipList::new()).unwrap();
    assert_eq!(first.verdicts, second.verdicts);
    assert_eq!(first.matches().count(), 2);
}

#[test]
fn report_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.jpg");
    let target = dir.path().join("images");
    write_faces(&base, &[ALICE]);
    write_faces(&target.join("a.jpg"), &[ALICE]);

    let mut driver = ReportDriver::new(PixelFaces::default(), MatchEngine::default());
    let report = driver.run(&base, &target, &SkipList::new()).unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    assert_eq!(json["policy"], "first-face");
    assert_eq!(json["verdicts"][0]["key"], 1);
    assert_eq!(json["verdicts"][0]["matched"], true);
}
