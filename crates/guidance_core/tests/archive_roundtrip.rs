use chrono::{TimeZone, Utc};
use guidance_core::archive::photo::to_data_url;
use guidance_core::archive::{export_archive, import_archive, unpack_archive, ArchiveError};
use guidance_core::db::{open_db_in_memory, Collection, Store, StoreError};
use guidance_core::{
    AppSettings, Classroom, CounselingNeededInfo, ImportStage, RosterService, Session,
    SessionType, SpecialStudentInfo, Student, WorkingDays,
};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, 1, 2, 3];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

struct Dataset {
    classrooms: Vec<Classroom>,
    students: Vec<Student>,
    sessions: Vec<Session>,
    session_types: Vec<SessionType>,
    special: Vec<SpecialStudentInfo>,
    counseling: Vec<CounselingNeededInfo>,
}

fn dataset(store: &Store) -> Dataset {
    Dataset {
        classrooms: store.get_all().unwrap(),
        students: store.get_all().unwrap(),
        sessions: store.get_all().unwrap(),
        session_types: store.get_all().unwrap(),
        special: store.get_all().unwrap(),
        counseling: store.get_all().unwrap(),
    }
}

fn seed(store: &Store) {
    let roster = RosterService::new(store);
    let classroom = roster.add_classroom(Classroom::new("11-A")).unwrap();
    let session_type = roster.add_session_type(SessionType::new("Family meeting")).unwrap();

    let mut with_png = Student::new(classroom.id.as_str(), "Ada", "Lovelace");
    with_png.national_id = Some("10000000001".to_string());
    with_png.photo = Some(to_data_url("image/png", PNG));
    let with_png = roster.add_student(with_png).unwrap();

    let mut with_jpeg = Student::new(classroom.id.as_str(), "Alan", "Turing");
    with_jpeg.national_id = Some("10000000002".to_string());
    with_jpeg.photo = Some(to_data_url("image/jpeg", JPEG));
    roster.add_student(with_jpeg).unwrap();

    let mut inline_only = Student::new(classroom.id.as_str(), "Grace", "Hopper");
    inline_only.photo = Some(to_data_url("image/jpeg", JPEG));
    roster.add_student(inline_only).unwrap();

    let mut session = Session::new(
        with_png.id.as_str(),
        session_type.id.as_str(),
        Utc.with_ymd_and_hms(2024, 11, 4, 10, 15, 0).unwrap(),
    );
    session.topic = Some("Study plan".to_string());
    session.duration_minutes = Some(30);
    roster.add_session(session).unwrap();

    roster
        .set_special_info(SpecialStudentInfo {
            student_id: with_png.id.clone(),
            is_special: true,
            notes: Some("extra time".to_string()),
        })
        .unwrap();
    roster
        .set_counseling_needed(CounselingNeededInfo {
            student_id: with_png.id.clone(),
            is_needed: false,
            notes: None,
        })
        .unwrap();

    let mut settings = AppSettings::default();
    settings.school_name = Some("North High".to_string());
    settings.more_menu_order = vec!["settings".to_string(), "students".to_string()];
    store.put_singleton(&settings).unwrap();
    store
        .put_singleton(&WorkingDays {
            saturday: true,
            ..WorkingDays::default()
        })
        .unwrap();
}

fn export_bytes(store: &Store) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    export_archive(store, &mut buffer).unwrap();
    buffer.into_inner()
}

fn archive_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn export_then_import_reproduces_every_collection() {
    let source = open_db_in_memory().unwrap();
    seed(&source);
    let expected = dataset(&source);
    let bytes = export_bytes(&source);

    let unpacked = unpack_archive(Cursor::new(bytes.clone())).unwrap();
    let mut photo_entries: Vec<String> = unpacked
        .assets
        .iter()
        .map(|asset| asset.entry_name.clone())
        .collect();
    photo_entries.sort();
    assert_eq!(
        photo_entries,
        vec!["photos/10000000001.png", "photos/10000000002.jpg"]
    );
    let inline: Vec<&Student> = unpacked
        .document
        .students
        .iter()
        .filter(|student| student.photo.is_some())
        .collect();
    assert_eq!(inline.len(), 1);
    assert!(inline[0].national_id.is_none());

    let target = open_db_in_memory().unwrap();
    target.add(Classroom::new("stale")).unwrap();
    let summary = import_archive(
        &target,
        Cursor::new(bytes),
        &AppSettings::default(),
        |_, _| {},
    )
    .unwrap();
    assert_eq!(summary.students, 3);
    assert_eq!(summary.assets_decoded, 2);
    assert_eq!(summary.photos_restored, 2);

    let restored = dataset(&target);
    assert_eq!(restored.classrooms, expected.classrooms);
    assert_eq!(restored.students, expected.students);
    assert_eq!(restored.sessions, expected.sessions);
    assert_eq!(restored.session_types, expected.session_types);
    assert_eq!(restored.special, expected.special);
    assert_eq!(restored.counseling, expected.counseling);

    let settings = target.singleton::<AppSettings>().unwrap().unwrap();
    assert_eq!(settings.school_name.as_deref(), Some("North High"));
    assert_eq!(&settings.more_menu_order[..2], ["settings", "students"]);
    assert_eq!(
        settings.more_menu_order.len(),
        AppSettings::default().more_menu_order.len()
    );
    assert!(target.singleton::<WorkingDays>().unwrap().unwrap().saturday);
}

#[test]
fn progress_reports_every_stage_in_order() {
    let source = open_db_in_memory().unwrap();
    seed(&source);
    let bytes = export_bytes(&source);

    let target = open_db_in_memory().unwrap();
    let mut seen = Vec::new();
    import_archive(
        &target,
        Cursor::new(bytes),
        &AppSettings::default(),
        |stage, percent| seen.push((stage, percent)),
    )
    .unwrap();

    assert_eq!(
        seen,
        vec![
            (ImportStage::ReadContainer, 10),
            (ImportStage::ParseDocument, 30),
            (ImportStage::DecodeAssets, 55),
            (ImportStage::Reconcile, 80),
            (ImportStage::Commit, 100),
        ]
    );
}

#[test]
fn container_without_document_is_rejected_and_store_is_unchanged() {
    let store = open_db_in_memory().unwrap();
    seed(&store);
    let before = dataset(&store);
    let bytes = archive_with(&[("photos/10000000001.png", PNG)]);

    let mut seen = Vec::new();
    let err = import_archive(
        &store,
        Cursor::new(bytes),
        &AppSettings::default(),
        |stage, _| seen.push(stage),
    )
    .unwrap_err();

    assert!(matches!(err, ArchiveError::Format(ref message) if message.contains("data.json")));
    assert_eq!(seen, vec![ImportStage::ReadContainer]);
    let after = dataset(&store);
    assert_eq!(after.classrooms, before.classrooms);
    assert_eq!(after.students, before.students);
    assert_eq!(after.sessions, before.sessions);
}

#[test]
fn undecodable_asset_aborts_before_commit() {
    let store = open_db_in_memory().unwrap();
    seed(&store);
    let student_count = store.count(Collection::Students).unwrap();

    let document = br#"{"format":"guidance-archive","version":2,"classrooms":[],"students":[]}"#;
    let bytes = archive_with(&[
        ("data.json", document.as_slice()),
        ("photos/1.png", PNG),
        ("photos/2.png", JPEG),
    ]);

    let err = import_archive(&store, Cursor::new(bytes), &AppSettings::default(), |_, _| {})
        .unwrap_err();
    match err {
        ArchiveError::AssetDecode { entry, .. } => assert_eq!(entry, "photos/2.png"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.count(Collection::Students).unwrap(), student_count);
}

#[test]
fn older_archive_without_settings_takes_running_defaults() {
    let store = open_db_in_memory().unwrap();
    let document = br#"{
        "classrooms": [{"id": "c1", "name": "8-C"}],
        "students": [{"id": "s1", "firstName": "Ada", "lastName": "Lovelace", "classroomId": "c1"}]
    }"#;
    let bytes = archive_with(&[("data.json", document.as_slice())]);

    let mut defaults = AppSettings::default();
    defaults.counselor_name = Some("Ms. Rivera".to_string());
    let summary = import_archive(&store, Cursor::new(bytes), &defaults, |_, _| {}).unwrap();

    assert_eq!(summary.classrooms, 1);
    assert!(!summary.working_days_restored);
    assert_eq!(store.singleton::<AppSettings>().unwrap(), Some(defaults));
    assert_eq!(store.singleton::<WorkingDays>().unwrap(), None);
    assert_eq!(store.count(Collection::Sessions).unwrap(), 0);
}

#[test]
fn newer_or_foreign_documents_are_format_errors() {
    let store = open_db_in_memory().unwrap();
    for document in [
        br#"{"format":"guidance-archive","version":99}"#.as_slice(),
        br#"{"format":"something-else"}"#.as_slice(),
        br#"{"classrooms":[{"name":"no id"}]}"#.as_slice(),
        b"not json".as_slice(),
    ] {
        let bytes = archive_with(&[("data.json", document)]);
        let err = import_archive(&store, Cursor::new(bytes), &AppSettings::default(), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Format(_)), "unexpected error: {err}");
    }
}

#[test]
fn photos_that_would_not_decode_identically_stay_inline() {
    let source = open_db_in_memory().unwrap();
    let mut classroom = Classroom::new("12-D");
    classroom.id = "c1".to_string();
    source.put(&classroom).unwrap();

    let photos = [
        ("s1", "123", "data:image/jpeg;base64,AAAA".to_string()),
        ("s2", "124", "data:image/jpg;base64,/9j/4AAQ".to_string()),
        ("s3", "125", "data:IMAGE/PNG;base64,iVBORw0KGgo=".to_string()),
        ("s4", "126", to_data_url("image/png", PNG)),
    ];
    for (id, national_id, photo) in &photos {
        let mut student = Student::new("c1", "Ada", "Lovelace");
        student.id = id.to_string();
        student.national_id = Some(national_id.to_string());
        student.photo = Some(photo.clone());
        source.put(&student).unwrap();
    }
    let expected: Vec<Student> = source.get_all().unwrap();

    let mut buffer = Cursor::new(Vec::new());
    let exported = export_archive(&source, &mut buffer).unwrap();
    assert_eq!(exported.photo_entries, 1);
    assert_eq!(exported.inline_photos, 3);

    let unpacked = unpack_archive(Cursor::new(buffer.get_ref().clone())).unwrap();
    let names: Vec<&str> = unpacked
        .assets
        .iter()
        .map(|asset| asset.entry_name.as_str())
        .collect();
    assert_eq!(names, vec!["photos/126.png"]);

    let target = open_db_in_memory().unwrap();
    let summary = import_archive(
        &target,
        Cursor::new(buffer.into_inner()),
        &AppSettings::default(),
        |_, _| {},
    )
    .unwrap();
    assert_eq!(summary.photos_restored, 1);
    assert_eq!(target.get_all::<Student>().unwrap(), expected);
}

#[test]
fn failing_commit_leaves_existing_records_in_place() {
    let store = open_db_in_memory().unwrap();
    let mut classroom = Classroom::new("keep");
    classroom.id = "keep".to_string();
    store.put(&classroom).unwrap();
    let mut student = Student::new("keep", "Grace", "Hopper");
    student.id = "kept".to_string();
    store.put(&student).unwrap();
    let before = dataset(&store);

    let document = br#"{
        "format": "guidance-archive",
        "version": 2,
        "classrooms": [{"id": "c1", "name": "9-A"}],
        "students": [
            {"id": "s1", "firstName": "Ada", "lastName": "Lovelace", "classroomId": "c1", "nationalId": "777"},
            {"id": "s2", "firstName": "Alan", "lastName": "Turing", "classroomId": "c1", "nationalId": "777"}
        ]
    }"#;
    let bytes = archive_with(&[("data.json", document.as_slice())]);

    let mut seen = Vec::new();
    let err = import_archive(
        &store,
        Cursor::new(bytes),
        &AppSettings::default(),
        |stage, _| seen.push(stage),
    )
    .unwrap_err();

    assert!(
        matches!(err, ArchiveError::Store(StoreError::Constraint(_))),
        "unexpected error: {err}"
    );
    assert!(!seen.contains(&ImportStage::Commit));
    let after = dataset(&store);
    assert_eq!(after.classrooms, before.classrooms);
    assert_eq!(after.students, before.students);
    assert_eq!(store.singleton::<AppSettings>().unwrap(), None);
}
