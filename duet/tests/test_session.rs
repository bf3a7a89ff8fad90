use std::sync::Arc;
use std::time::Duration;

use duet::ClientError;
use duet::config::ConfigManager;
use duet::models::{Direction, LastSeen};
use duet::session::Session;
use duet::storage::Storage;
use duet_core::{ChatId, Identity, Recipient, Rejection};
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout;
use tracing_test::traced_test;

fn id(s: &str) -> Identity {
    s.parse().unwrap()
}

async fn open_temp_storage() -> (tempfile::TempDir, Arc<TokioMutex<Storage>>) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let storage = Storage::create(dir.path())
        .await
        .expect("failed to create storage");
    (dir, Arc::new(TokioMutex::new(storage)))
}

async fn signed_in(storage: &Arc<TokioMutex<Storage>>, identity: &str) -> Session {
    let session = Session::open(storage.clone()).await.unwrap();
    session.sign_in(id(identity), None).await.unwrap();
    session
}

/// Test that operations needing an identity fail while signed out.
#[tokio::test]
#[traced_test]
async fn test_signed_out_session_is_unauthenticated() {
    let (_dir, storage) = open_temp_storage().await;
    let session = Session::open(storage.clone()).await.unwrap();

    assert!(session.account().is_none());
    assert!(matches!(
        session.chat_list().await,
        Err(ClientError::AuthUnavailable)
    ));
    assert!(matches!(
        session.start_chat("b@x.com").await,
        Err(ClientError::AuthUnavailable)
    ));
    let chat_id = ChatId::for_pair(&id("a@x.com"), &id("b@x.com"));
    assert!(matches!(
        session.send_message(chat_id, "hi").await,
        Err(ClientError::AuthUnavailable)
    ));
    assert!(session.subscribe_chats().is_err());
}

/// Test that the signed-in identity is restored on the next open.
#[tokio::test]
#[traced_test]
async fn test_sign_in_persists_across_sessions() {
    let (_dir, storage) = open_temp_storage().await;
    let session = Session::open(storage.clone()).await.unwrap();
    let presence = session
        .sign_in(id("a@x.com"), Some("http://img/a".to_string()))
        .await
        .unwrap();
    assert_eq!(presence.identity, id("a@x.com"));
    drop(session);

    let session = Session::open(storage.clone()).await.unwrap();
    let account = session.account().expect("account should be restored");
    assert_eq!(account.identity, id("a@x.com"));
    assert_eq!(account.photo_url.as_deref(), Some("http://img/a"));

    session.sign_out().await.unwrap();
    assert!(session.identity().is_none());
    drop(session);

    let session = Session::open(storage.clone()).await.unwrap();
    assert!(session.account().is_none());
}

/// Test that account watchers observe sign-in and sign-out.
#[tokio::test]
#[traced_test]
async fn test_watch_account() {
    let (_dir, storage) = open_temp_storage().await;
    let session = Session::open(storage.clone()).await.unwrap();
    let mut watcher = session.watch_account();
    assert!(watcher.borrow().is_none());

    session.sign_in(id("a@x.com"), None).await.unwrap();
    timeout(Duration::from_secs(5), watcher.changed())
        .await
        .expect("timeout waiting for sign-in")
        .unwrap();
    assert_eq!(
        watcher.borrow_and_update().as_ref().map(|a| a.identity.clone()),
        Some(id("a@x.com"))
    );

    session.sign_out().await.unwrap();
    timeout(Duration::from_secs(5), watcher.changed())
        .await
        .expect("timeout waiting for sign-out")
        .unwrap();
    assert!(watcher.borrow().is_none());
}

/// Test that start_chat applies every rejection rule.
#[tokio::test]
#[traced_test]
async fn test_start_chat_rejections() {
    let (_dir, storage) = open_temp_storage().await;
    let session = signed_in(&storage, "a@x.com").await;

    let err = session.start_chat("not-an-email").await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::InvalidAddress("not-an-email".to_string()))
    );

    let err = session.start_chat("a@x.com").await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::SelfChat));

    let chat = session.start_chat("b@x.com").await.unwrap();
    let err = session.start_chat("b@x.com").await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::DuplicateChat(chat.id())));

    assert_eq!(session.chat_list().await.unwrap().len(), 1);
}

/// Test that a chat started by the other party blocks a second one.
#[tokio::test]
#[traced_test]
async fn test_start_chat_from_other_side_is_duplicate() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    let chat = alice.start_chat("b@x.com").await.unwrap();

    let bob = signed_in(&storage, "b@x.com").await;
    let err = bob.start_chat("a@x.com").await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::DuplicateChat(chat.id())));

    let entries = bob.chat_list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].recipient, Recipient::Known(id("a@x.com")));
}

/// Test sending messages between both members of a chat.
#[tokio::test]
#[traced_test]
async fn test_send_message_between_members() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    let chat_id = alice.start_chat("b@x.com").await.unwrap().id();
    let bob = signed_in(&storage, "b@x.com").await;

    alice.send_message(chat_id, "hi bob").await.unwrap();
    bob.send_message(chat_id, "hi alice").await.unwrap();

    let chat = alice.open_chat(chat_id).await.unwrap();
    let messages = chat.messages().await.unwrap();
    assert_eq!(messages.len(), 2);
    let me = id("a@x.com");
    assert_eq!(messages[0].direction(&me), Direction::Sent);
    assert_eq!(messages[1].direction(&me), Direction::Received);
    assert_eq!(messages[1].author, id("b@x.com"));
}

/// Test that sending marks the sender as active.
#[tokio::test]
#[traced_test]
async fn test_send_message_touches_presence() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    let chat = alice.start_chat("b@x.com").await.unwrap();

    // The recipient never signed in.
    assert!(alice.recipient_presence(&chat).await.unwrap().is_none());
    assert_eq!(
        alice.last_seen(&id("b@x.com")).await.unwrap(),
        LastSeen::Never
    );

    let before = alice.presence().get(&id("a@x.com")).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let message = alice.send_message(chat.id(), "hello").await.unwrap();
    let after = alice.presence().get(&id("a@x.com")).await.unwrap().unwrap();
    assert!(after.last_seen > before.last_seen);
    assert!(after.last_seen <= message.create_time);
}

/// Test the error cases of send_message.
#[tokio::test]
#[traced_test]
async fn test_send_message_errors() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    let chat = alice.start_chat("b@x.com").await.unwrap();

    assert!(matches!(
        alice.send_message(chat.id(), "  ").await,
        Err(ClientError::EmptyMessage)
    ));

    let missing = ChatId::for_pair(&id("a@x.com"), &id("c@x.com"));
    match alice.send_message(missing, "hi").await {
        Err(ClientError::ChatNotFound(chat_id)) => assert_eq!(chat_id, missing),
        other => panic!("expected ChatNotFound, got {:?}", other),
    }
    assert!(chat.messages().await.unwrap().is_empty());
}

/// Test searching the chat list by recipient.
#[tokio::test]
#[traced_test]
async fn test_search_chats() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    alice.start_chat("bob@x.com").await.unwrap();
    alice.start_chat("carol@y.org").await.unwrap();

    assert_eq!(alice.search_chats("").await.unwrap().len(), 2);
    let found = alice.search_chats("BOB").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].recipient, Recipient::Known(id("bob@x.com")));
    assert_eq!(alice.search_chats("y.org").await.unwrap().len(), 1);
    assert!(alice.search_chats("dave").await.unwrap().is_empty());
}

/// Test that new chats reach the subscribed member.
#[tokio::test]
#[traced_test]
async fn test_subscribe_chats() {
    let (_dir, storage) = open_temp_storage().await;
    let alice = signed_in(&storage, "a@x.com").await;
    let mut subscription = alice.subscribe_chats().unwrap();

    let chat = alice.start_chat("b@x.com").await.unwrap();
    let received = timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("timeout waiting for chat")
        .expect("subscription closed");
    assert_eq!(received.id, chat.id());
    assert_eq!(
        received.recipient(alice.identity().as_ref()),
        Recipient::Known(id("b@x.com"))
    );
}

/// Test that a sign-in that fails half way is not restored later.
#[tokio::test]
#[traced_test]
async fn test_failed_sign_in_is_not_persisted() {
    let (_dir, storage) = open_temp_storage().await;
    let session = Session::open(storage.clone()).await.unwrap();
    {
        let mut guard = storage.lock().await;
        let conn = guard.connection().await;
        conn.execute("DROP TABLE \"presence\"", Vec::<tokio_sqlite::Value>::new())
            .await
            .unwrap();
    }

    let err = session.sign_in(id("a@x.com"), None).await.unwrap_err();
    assert!(matches!(err, ClientError::StorageUnavailable(_)));
    assert!(session.account().is_none());
    drop(session);

    let session = Session::open(storage.clone()).await.unwrap();
    assert!(session.account().is_none());
    assert_eq!(session.config().get_identity().await.unwrap(), None);
}

/// Test that only members of a chat can post to it.
#[tokio::test]
#[traced_test]
async fn test_outsider_cannot_send() {
    let (_dir, storage) = open_temp_storage().await;
    let session = signed_in(&storage, "a@x.com").await;
    let chat = session.start_chat("b@x.com").await.unwrap();

    session.sign_in(id("c@x.com"), None).await.unwrap();
    let before = session.presence().get(&id("c@x.com")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    match session.send_message(chat.id(), "let me in").await {
        Err(ClientError::NotMember(chat_id)) => assert_eq!(chat_id, chat.id()),
        other => panic!("expected NotMember, got {:?}", other),
    }
    assert!(chat.messages().await.unwrap().is_empty());
    // Rejected before the outsider is marked active.
    let after = session.presence().get(&id("c@x.com")).await.unwrap();
    assert_eq!(after, before);
}

/// Test that sign-out gives up when the store does not answer in time.
#[tokio::test]
#[traced_test]
async fn test_sign_out_is_bounded_by_write_timeout() {
    let (_dir, storage) = open_temp_storage().await;
    ConfigManager::new(storage.clone())
        .set_write_timeout(Duration::from_millis(50))
        .await
        .unwrap();
    let session = signed_in(&storage, "a@x.com").await;

    let guard = storage.lock().await;
    let result = timeout(Duration::from_secs(2), session.sign_out())
        .await
        .expect("sign_out was not bounded");
    drop(guard);

    assert!(matches!(result, Err(ClientError::StorageUnavailable(_))));
    assert_eq!(session.identity(), Some(id("a@x.com")));
}
