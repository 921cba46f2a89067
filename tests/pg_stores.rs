use chrono::{Duration, Utc};
use oasis_api::auth::{
    AuthError, CredentialStore, PgCredentialStore, PgSessionRegistry, SessionRegistry,
};
use oasis_api::test_support::{TestDatabase, TestDatabaseError};

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping {test_name}: container runtime unavailable ({err})");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

#[tokio::test]
async fn partial_unique_indexes_bind_only_active_users() {
    let Some(test_db) = provision("partial_unique_indexes_bind_only_active_users").await else {
        return;
    };
    let store = PgCredentialStore::new(test_db.pool_clone());

    let kim = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("create");

    let duplicate_email = store.create("Lee", "lee01", "a@b.com", "hash").await;
    assert!(
        matches!(&duplicate_email, Err(AuthError::Conflict(msg)) if msg == "Email is already registered"),
        "{duplicate_email:?}"
    );
    let duplicate_nickname = store.create("Lee", "kim01", "c@d.com", "hash").await;
    assert!(
        matches!(&duplicate_nickname, Err(AuthError::Conflict(msg)) if msg == "Nickname is already taken"),
        "{duplicate_nickname:?}"
    );

    assert_eq!(store.withdraw(&kim.id).await.expect("withdraw"), Some(0));
    assert_eq!(store.withdraw(&kim.id).await.expect("withdraw again"), None);
    assert!(store.find_by_email("a@b.com").await.expect("lookup").is_none());
    let reborn = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("former email and nickname are reusable");
    assert_ne!(reborn.id, kim.id);

    let archived = store
        .find_by_id(&kim.id)
        .await
        .expect("lookup")
        .expect("soft-deleted row is retained");
    assert!(archived.deleted_at.is_some());

    assert!(store
        .update_profile(&kim.id, "kim09", None)
        .await
        .expect("update")
        .is_none());
    let renamed = store
        .update_profile(&reborn.id, "kim09", Some("hash-2"))
        .await
        .expect("update")
        .expect("active row updated");
    assert_eq!(renamed.nickname, "kim09");
    assert_eq!(renamed.password_hash, "hash-2");

    assert!(store
        .reset_password("Kim", "a@b.com", "hash-3")
        .await
        .expect("reset"));
    assert!(!store
        .reset_password("Lee", "a@b.com", "hash-3")
        .await
        .expect("reset"));

    test_db.close().await;
}

#[tokio::test]
async fn session_registry_enforces_single_live_session() {
    let Some(test_db) = provision("session_registry_enforces_single_live_session").await else {
        return;
    };
    let store = PgCredentialStore::new(test_db.pool_clone());
    let registry = PgSessionRegistry::new(test_db.pool_clone());
    let user = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("create");
    let expires = Utc::now() + Duration::days(1);

    registry
        .create(&user.id, "token-a", expires)
        .await
        .expect("first session");
    assert!(matches!(
        registry.create(&user.id, "token-b", expires).await,
        Err(AuthError::Conflict(_))
    ));

    let stored: String = sqlx::query_scalar("SELECT token_hash FROM sessions WHERE user_id = $1")
        .bind(&user.id)
        .fetch_one(test_db.pool())
        .await
        .expect("row");
    assert_ne!(stored, "token-a");

    assert!(registry
        .rotate(&user.id, "token-a", "token-c", expires + Duration::days(1))
        .await
        .expect("rotate"));
    assert!(!registry
        .rotate(&user.id, "token-a", "token-d", expires)
        .await
        .expect("stale rotate"));
    assert!(registry.find_by_token("token-a").await.expect("lookup").is_none());
    assert!(registry
        .touch_access_issued("token-c")
        .await
        .expect("touch"));
    let live = registry
        .find_by_user(&user.id)
        .await
        .expect("lookup")
        .expect("live session");
    assert!(live.accesstoken_updated_at.is_some());

    assert_eq!(registry.revoke("token-c").await.expect("revoke"), 1);
    assert_eq!(registry.revoke("token-c").await.expect("revoke again"), 0);
    registry
        .create(&user.id, "token-e", expires)
        .await
        .expect("new session after revoke");
    assert_eq!(registry.revoke_by_user(&user.id).await.expect("revoke all"), 1);
    assert!(registry.find_by_user(&user.id).await.expect("lookup").is_none());

    test_db.close().await;
}

#[tokio::test]
async fn concurrent_logins_leave_one_session() {
    let Some(test_db) = provision("concurrent_logins_leave_one_session").await else {
        return;
    };
    let store = PgCredentialStore::new(test_db.pool_clone());
    let registry = PgSessionRegistry::new(test_db.pool_clone());
    let user = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("create");
    let expires = Utc::now() + Duration::days(1);

    let attempts = (0..8).map(|i| {
        let registry = registry.clone();
        let user_id = user.id.clone();
        tokio::spawn(async move {
            registry
                .create(&user_id, &format!("token-{i}"), expires)
                .await
        })
    });
    let mut created = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.expect("task") {
            Ok(_) => created += 1,
            Err(AuthError::Conflict(_)) => {}
            Err(err) => panic!("unexpected error: {err:?}"),
        }
    }
    assert_eq!(created, 1);

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND deleted_at IS NULL",
    )
    .bind(&user.id)
    .fetch_one(test_db.pool())
    .await
    .expect("count");
    assert_eq!(live, 1);

    test_db.close().await;
}

#[tokio::test]
async fn withdrawal_revokes_sessions_and_blocks_new_ones() {
    let Some(test_db) = provision("withdrawal_revokes_sessions_and_blocks_new_ones").await else {
        return;
    };
    let store = PgCredentialStore::new(test_db.pool_clone());
    let registry = PgSessionRegistry::new(test_db.pool_clone());
    let user = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("create");
    let expires = Utc::now() + Duration::days(1);
    registry
        .create(&user.id, "token-a", expires)
        .await
        .expect("session");

    assert_eq!(store.withdraw(&user.id).await.expect("withdraw"), Some(1));
    assert!(registry.find_by_token("token-a").await.expect("lookup").is_none());
    let stored = store
        .find_by_id(&user.id)
        .await
        .expect("lookup")
        .expect("row kept");
    assert!(stored.deleted_at.is_some());

    let late = registry.create(&user.id, "token-b", expires).await;
    assert!(matches!(&late, Err(AuthError::NotFound(_))), "{late:?}");

    test_db.close().await;
}

#[tokio::test]
async fn logins_racing_withdrawal_leave_no_live_session() {
    let Some(test_db) = provision("logins_racing_withdrawal_leave_no_live_session").await else {
        return;
    };
    let store = PgCredentialStore::new(test_db.pool_clone());
    let registry = PgSessionRegistry::new(test_db.pool_clone());
    let user = store
        .create("Kim", "kim01", "a@b.com", "hash")
        .await
        .expect("create");
    let expires = Utc::now() + Duration::days(1);

    let logins: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let user_id = user.id.clone();
            tokio::spawn(async move {
                registry
                    .create(&user_id, &format!("token-{i}"), expires)
                    .await
            })
        })
        .collect();
    let withdrawal = {
        let store = store.clone();
        let user_id = user.id.clone();
        tokio::spawn(async move { store.withdraw(&user_id).await })
    };

    for login in logins {
        match login.await.expect("task") {
            Ok(_) | Err(AuthError::Conflict(_)) | Err(AuthError::NotFound(_)) => {}
            Err(err) => panic!("unexpected error: {err:?}"),
        }
    }
    assert!(withdrawal.await.expect("task").expect("withdraw").is_some());

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND deleted_at IS NULL",
    )
    .bind(&user.id)
    .fetch_one(test_db.pool())
    .await
    .expect("count");
    assert_eq!(live, 0);

    test_db.close().await;
}
