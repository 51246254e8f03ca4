
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn forum_threads_replies_and_author_only_delete() {
    let workspace = temp_dir("hearth-forum");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let g1 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "guardians.create",
        json!({ "displayName": "Rina Calloway", "email": "rina@example.org" }),
    );
    let rina = g1.get("guardianId").and_then(|v| v.as_str()).expect("guardianId").to_string();
    let g2 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "guardians.create",
        json!({ "displayName": "Joss Calloway", "email": "joss@example.org" }),
    );
    let joss = g2.get("guardianId").and_then(|v| v.as_str()).expect("guardianId").to_string();

    let t1 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "forum.threads.create",
        json!({
            "guardianId": rina,
            "title": "Fraction materials for a 9 year old?",
            "body": "Looking for ideas beyond the fraction insets."
        }),
    );
    let thread1 = t1.get("threadId").and_then(|v| v.as_str()).expect("threadId").to_string();
    let t2 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "forum.threads.create",
        json!({
            "guardianId": joss,
            "title": "Weekly rhythm with two levels",
            "body": "How do you structure mornings?"
        }),
    );
    let thread2 = t2.get("threadId").and_then(|v| v.as_str()).expect("threadId").to_string();

    // A reply bumps its thread to the top of the listing. Timestamps have
    // second resolution, so step past the creation second first.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let r1 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "forum.replies.create",
        json!({
            "threadId": thread1,
            "guardianId": joss,
            "body": "We had luck with the fraction skittles."
        }),
    );
    let reply1 = r1.get("replyId").and_then(|v| v.as_str()).expect("replyId").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "7", "forum.threads.list", json!({}));
    let threads = listed.get("threads").and_then(|v| v.as_array()).expect("threads");
    assert_eq!(threads.len(), 2);
    assert_eq!(
        threads[0].get("threadId").and_then(|v| v.as_str()),
        Some(thread1.as_str())
    );
    assert_eq!(threads[0].get("replyCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        threads[1].get("threadId").and_then(|v| v.as_str()),
        Some(thread2.as_str())
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "forum.threads.open",
        json!({ "threadId": thread1 }),
    );
    assert_eq!(
        opened.pointer("/thread/authorName").and_then(|v| v.as_str()),
        Some("Rina Calloway")
    );
    let replies = opened.get("replies").and_then(|v| v.as_array()).expect("replies");
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0].get("authorName").and_then(|v| v.as_str()),
        Some("Joss Calloway")
    );

    // Only the author may delete a reply.
    let forbidden = request(
        &mut stdin,
        &mut reader,
        "9",
        "forum.replies.delete",
        json!({ "replyId": reply1, "guardianId": rina }),
    );
    assert_eq!(error_code(&forbidden), "forbidden");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "forum.replies.delete",
        json!({ "replyId": reply1, "guardianId": joss }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "11",
        "forum.replies.delete",
        json!({ "replyId": reply1, "guardianId": joss }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let missing_thread = request(
        &mut stdin,
        &mut reader,
        "12",
        "forum.replies.create",
        json!({ "threadId": "nope", "guardianId": rina, "body": "hello" }),
    );
    assert_eq!(error_code(&missing_thread), "not_found");

    drop(stdin);
    let _ = child.wait();
}
