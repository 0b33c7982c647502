//! End-to-end licensing scenarios against a real database file.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use keyward_core::{GuildId, MemberId, RoleId};
use keyward_db::{DbError, LicenseStore, StoreConfig};

async fn open(dir: &TempDir) -> LicenseStore {
    LicenseStore::open(StoreConfig::new(dir.path()), "main")
        .await
        .unwrap()
}

#[tokio::test]
async fn generate_lookup_redeem_list() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let licenses = store.licenses();
    let (guild, role) = (GuildId::new(1), RoleId::new(7));

    let codes = licenses.generate_licenses(3, guild, role).await.unwrap();
    assert_eq!(codes.len(), 3);
    assert_eq!(licenses.get_license_role(&codes[0]).await.unwrap(), role);

    assert!(licenses.redeem_license(&codes[0], guild).await.unwrap());

    let remaining = licenses.list_licenses(10, guild, role).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains(&codes[0]));

    let err = licenses.get_license_role(&codes[0]).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn unconfigured_guild_has_no_default_role() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let err = store
        .guilds()
        .get_default_license_role(GuildId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn default_role_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let guilds = store.guilds();
    let guild = GuildId::new(5);

    guilds
        .set_default_license_role(guild, Some(RoleId::new(42)))
        .await
        .unwrap();
    assert_eq!(
        guilds.get_default_license_role(guild).await.unwrap(),
        RoleId::new(42)
    );

    guilds.set_default_license_role(guild, None).await.unwrap();
    assert!(guilds
        .get_default_license_role(guild)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn reopen_keeps_data_and_schema() {
    let dir = TempDir::new().unwrap();
    let (guild, role) = (GuildId::new(1), RoleId::new(7));

    let store = open(&dir).await;
    let codes = store
        .licenses()
        .generate_licenses(2, guild, role)
        .await
        .unwrap();
    store.close().await;

    let store = open(&dir).await;
    assert!(store.health_check().await);
    assert_eq!(
        store.licenses().list_licenses(10, guild, role).await.unwrap(),
        codes
    );
    store.close().await;
}

#[tokio::test]
async fn closed_store_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.close().await;

    let err = store
        .licenses()
        .redeem_license("ANY", GuildId::new(1))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemption_removes_once() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let guild = GuildId::new(1);
    let codes = store
        .licenses()
        .generate_licenses(1, guild, RoleId::new(7))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let licenses = store.licenses();
        let code = codes[0].clone();
        tasks.push(tokio::spawn(async move {
            licenses.redeem_license(&code, guild).await.unwrap()
        }));
    }

    let mut removed = 0;
    for task in tasks {
        if task.await.unwrap() {
            removed += 1;
        }
    }
    assert_eq!(removed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_member_redemption_grants_once() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let guild = GuildId::new(1);
    let codes = store
        .licenses()
        .generate_licenses(1, guild, RoleId::new(7))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for member in 1..=6u64 {
        let licenses = store.licenses();
        let code = codes[0].clone();
        tasks.push(tokio::spawn(async move {
            licenses
                .redeem_for_member(&code, guild, MemberId::new(member))
                .await
        }));
    }

    let mut granted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => granted += 1,
            Err(err) => assert!(err.is_not_found(), "unexpected error: {err}"),
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(store.members().list_for_guild(guild).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_batch_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir)
        .await
        .with_generator(|count: usize| vec!["SAME".to_string(); count]);
    let (guild, role) = (GuildId::new(1), RoleId::new(7));

    let err = store
        .licenses()
        .generate_licenses(2, guild, role)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateLicense { .. }));
    assert!(store
        .licenses()
        .list_licenses(10, guild, role)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn list_never_exceeds_limit_or_returns_redeemed() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let licenses = store.licenses();
    let (guild, role) = (GuildId::new(1), RoleId::new(7));

    let codes = licenses.generate_licenses(20, guild, role).await.unwrap();
    for code in codes.iter().step_by(2) {
        assert!(licenses.redeem_license(code, guild).await.unwrap());
    }

    for limit in [0u32, 1, 5, 10, 50] {
        let listed = licenses.list_licenses(limit, guild, role).await.unwrap();
        assert!(listed.len() <= limit as usize);
        assert!(listed.iter().all(|c| !codes.iter().step_by(2).any(|r| r == c)));
    }

    let all: HashSet<_> = licenses
        .list_licenses(50, guild, role)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(all.len(), 10);
}

#[tokio::test]
async fn redemption_uses_guild_duration_and_expires() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let guild = GuildId::new(1);
    store
        .guilds()
        .set_default_license_duration(guild, 1)
        .await
        .unwrap();

    let codes = store
        .licenses()
        .generate_licenses(1, guild, RoleId::new(7))
        .await
        .unwrap();
    let grant = store
        .licenses()
        .redeem_for_member(&codes[0], guild, MemberId::new(3))
        .await
        .unwrap();

    let members = store.members();
    assert!(members.expired(Utc::now(), 10).await.unwrap().is_empty());

    let later = members
        .expired(Utc::now() + Duration::hours(2), 10)
        .await
        .unwrap();
    assert_eq!(later, vec![grant]);
}

#[tokio::test]
async fn backup_writes_a_copy() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .licenses()
        .generate_licenses(3, GuildId::new(1), RoleId::new(7))
        .await
        .unwrap();

    let path = store.backup().await.unwrap();
    assert!(path.exists());
    assert_eq!(path.parent(), Some(dir.path()));
}
