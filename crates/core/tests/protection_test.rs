//! End-to-end tests for detection, set-password and remove-password.

use pdfseal_core::model::{Dictionary, PDFObject};
use pdfseal_core::protection::OpenResolver;
use pdfseal_core::{
    AccessMode, ErrorKind, OpenOptions, ParsedDocument, PdfError, Permissions, ProtectionStatus, ReadAccuracy,
    SecurityLevel, SetPasswordOptions, detect_protection, detect_protection_with_password,
    is_permission_password_protected, is_view_password_protected, open_document, remove_password,
    set_password, set_password_with,
};

const CONTENT: &str = "BT /F1 12 Tf 72 712 Td (Quarterly numbers) Tj ET";

fn build_minimal_pdf_with_pages(page_count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets: Vec<usize> = Vec::new();
    let push_obj = |buf: &mut Vec<u8>, obj: String, offsets: &mut Vec<usize>| {
        offsets.push(buf.len());
        buf.extend_from_slice(obj.as_bytes());
    };

    push_obj(
        &mut out,
        "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_string(),
        &mut offsets,
    );
    let kids: String = (0..page_count)
        .map(|i| format!("{} 0 R", 3 + i))
        .collect::<Vec<_>>()
        .join(" ");
    push_obj(
        &mut out,
        format!("2 0 obj\n<< /Type /Pages /Kids [{kids}] /Count {page_count} >>\nendobj\n"),
        &mut offsets,
    );
    for i in 0..page_count {
        let contents_id = 3 + page_count + i;
        push_obj(
            &mut out,
            format!(
                "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {contents_id} 0 R >>\nendobj\n",
                3 + i
            ),
            &mut offsets,
        );
    }
    for i in 0..page_count {
        push_obj(
            &mut out,
            format!(
                "{} 0 obj\n<< /Length {} >>\nstream\n{CONTENT}\nendstream\nendobj\n",
                3 + page_count + i,
                CONTENT.len()
            ),
            &mut offsets,
        );
    }

    let xref_pos = out.len();
    let obj_count = offsets.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", obj_count + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R /Info << /Title (Numbers) >> >>\nstartxref\n{xref_pos}\n%%EOF",
            obj_count + 1
        )
        .as_bytes(),
    );
    out
}

fn contents_of(bytes: &[u8], password: &str) -> Vec<u8> {
    let doc = open_document(bytes, &OpenOptions::new().password(password).mode(AccessMode::ReadOnly))
        .expect("document opens");
    doc.objects()
        .values()
        .find_map(|obj| obj.as_stream().ok())
        .map(|stream| stream.get_rawdata().to_vec())
        .expect("content stream")
}

#[test]
fn same_user_and_owner_password_is_view_protected_only() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "secret", Some("secret")).expect("lock");
    let status = detect_protection_with_password(&locked, Some("secret")).expect("detect");
    assert_eq!(
        status,
        ProtectionStatus {
            view_protected: true,
            permission_protected: false,
        }
    );
}

#[test]
fn distinct_passwords_are_fully_protected() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "u", Some("o")).expect("lock");
    let status = detect_protection(&locked).expect("detect");
    assert!(status.view_protected);
    assert!(status.permission_protected);
    let status = detect_protection_with_password(&locked, Some("u")).expect("detect");
    assert!(status.permission_protected);
}

#[test]
fn unlock_with_owner_password_restores_plain_document() {
    let original = build_minimal_pdf_with_pages(2);
    let locked = set_password(&original, "pw1", Some("pw2")).expect("lock");
    assert!(!locked.windows(CONTENT.len()).any(|w| w == CONTENT.as_bytes()));

    let unlocked = remove_password(&locked, "pw2").expect("unlock");
    assert_eq!(detect_protection(&unlocked).expect("detect"), ProtectionStatus::default());
    assert_eq!(contents_of(&unlocked, ""), CONTENT.as_bytes());

    let before = open_document(&original, &OpenOptions::new()).expect("open original");
    let after = open_document(&unlocked, &OpenOptions::new()).expect("open unlocked");
    for (&id, obj) in before.objects() {
        assert_eq!(after.get(id), Some(obj), "object {id:?}");
    }
    assert_eq!(info_of(&before), info_of(&after));
}

fn info_of(doc: &ParsedDocument) -> Dictionary {
    doc.trailer()
        .get("Info")
        .and_then(|info| doc.resolve(info))
        .and_then(PDFObject::dict)
        .cloned()
        .expect("Info dictionary")
}

#[test]
fn locked_output_does_not_leak_info_strings() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "u", Some("o")).expect("lock");
    assert!(!locked.windows(b"Numbers".len()).any(|w| w == b"Numbers"));

    let doc = open_document(&locked, &OpenOptions::new().password("u")).expect("open");
    assert_eq!(info_of(&doc).get("Title"), Some(&PDFObject::String(b"Numbers".to_vec())));
}

#[test]
fn detection_is_idempotent() {
    let plain = build_minimal_pdf_with_pages(1);
    let permission_only = set_password_with(&plain, &SetPasswordOptions::new("").owner_password("o")).expect("lock");
    let view = set_password(&plain, "u", Some("o")).expect("lock");

    for (bytes, expected) in [
        (&plain, ProtectionStatus::default()),
        (
            &permission_only,
            ProtectionStatus {
                view_protected: false,
                permission_protected: true,
            },
        ),
        (
            &view,
            ProtectionStatus {
                view_protected: true,
                permission_protected: true,
            },
        ),
    ] {
        let snapshot = bytes.clone();
        let first = detect_protection(bytes).expect("detect");
        let second = detect_protection(bytes).expect("detect");
        assert_eq!(first, expected);
        assert_eq!(first, second);
        assert_eq!(
            detect_protection_with_password(bytes, Some("u")).expect("detect"),
            detect_protection_with_password(bytes, Some("u")).expect("detect")
        );
        assert_eq!(*bytes, snapshot);
    }
}

#[test]
fn locked_content_decrypts_with_user_password() {
    for level in [SecurityLevel::Rc4_40, SecurityLevel::Rc4_128, SecurityLevel::Aes128] {
        let opts = SetPasswordOptions::new("reader").owner_password("admin").level(level);
        let locked = set_password_with(&build_minimal_pdf_with_pages(1), &opts).expect("lock");
        assert_eq!(contents_of(&locked, "reader"), CONTENT.as_bytes(), "{level:?}");
    }
}

#[test]
fn unlocking_requires_the_owner_password() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "u", Some("o")).expect("lock");
    for password in ["u", "nope", ""] {
        let err = remove_password(&locked, password).expect_err("not the owner password");
        assert_eq!(err.kind(), ErrorKind::Password, "{password:?}");
    }
}

#[test]
fn already_protected_and_not_protected() {
    let plain = build_minimal_pdf_with_pages(1);
    let err = remove_password(&plain, "anything").expect_err("plain document");
    assert_eq!(err.kind(), ErrorKind::NotProtected);

    let locked = set_password(&plain, "u", None).expect("lock");
    let err = set_password(&locked, "u", None).expect_err("already locked");
    assert_eq!(err.kind(), ErrorKind::AlreadyProtected);
}

#[test]
fn non_pdf_input_is_structural_everywhere() {
    for input in [&b""[..], &b"%PD"[..], &b"hello world, not a pdf"[..]] {
        let kind = |err: PdfError| err.kind();
        assert_eq!(kind(detect_protection(input).expect_err("detect")), ErrorKind::Structural);
        assert_eq!(kind(is_view_password_protected(input).expect_err("view")), ErrorKind::Structural);
        assert_eq!(
            kind(is_permission_password_protected(input, None).expect_err("perm")),
            ErrorKind::Structural
        );
        assert_eq!(kind(set_password(input, "a", None).expect_err("set")), ErrorKind::Structural);
        assert_eq!(kind(remove_password(input, "a").expect_err("remove")), ErrorKind::Structural);
    }
}

#[test]
fn modify_needs_owner_other_modes_accept_user() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "u", Some("o")).expect("lock");
    let pinned = |mode, password: &str| {
        OpenOptions::new()
            .password(password)
            .mode(mode)
            .accuracy(ReadAccuracy::Strict)
    };

    let err = open_document(&locked, &pinned(AccessMode::Modify, "u")).expect_err("user cannot modify");
    assert!(matches!(err, PdfError::OwnerPasswordRequired));
    assert!(open_document(&locked, &pinned(AccessMode::Modify, "o")).is_ok());
    for mode in [AccessMode::Import, AccessMode::ReadOnly, AccessMode::InformationOnly] {
        assert!(open_document(&locked, &pinned(mode, "u")).is_ok(), "{mode:?}");
    }
}

#[test]
fn permissions_survive_locking() {
    let denied = Permissions::MODIFY | Permissions::COPY;
    let opts = SetPasswordOptions::new("")
        .owner_password("owner")
        .permissions(Permissions::all() - denied);
    let locked = set_password_with(&build_minimal_pdf_with_pages(1), &opts).expect("lock");

    let doc = open_document(&locked, &OpenOptions::new().mode(AccessMode::ReadOnly)).expect("open");
    let perms = doc.security().permissions;
    assert!(perms.contains(Permissions::PRINT));
    assert!(!perms.intersects(denied));
}

#[test]
fn unlocked_output_keeps_info_and_id() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "a", Some("b")).expect("lock");
    let unlocked = remove_password(&locked, "b").expect("unlock");
    let before = open_document(&locked, &OpenOptions::new().password("b")).expect("open");
    let after = open_document(&unlocked, &OpenOptions::new()).expect("open");
    assert_eq!(before.file_id(), after.file_id());
    assert!(after.trailer().contains_key("Info"));
    assert!(!after.trailer().contains_key("Encrypt"));
}

#[test]
fn detection_probes_attempt_once() {
    let locked = set_password(&build_minimal_pdf_with_pages(1), "u", Some("o")).expect("lock");
    let options = OpenOptions::new()
        .mode(AccessMode::InformationOnly)
        .accuracy(ReadAccuracy::Strict);
    let mut resolver = OpenResolver::new(&options);
    let result = resolver.run(|attempt| ParsedDocument::parse(&locked, None, attempt));
    assert!(result.expect_err("no password").is_password_error());
    assert_eq!(resolver.attempts().len(), 1);
}

#[test]
fn lock_output_is_deterministic_for_rc4() {
    let plain = build_minimal_pdf_with_pages(1);
    let a = set_password(&plain, "u", Some("o")).expect("lock");
    let b = set_password(&plain, "u", Some("o")).expect("lock");
    assert_eq!(a, b);
}
