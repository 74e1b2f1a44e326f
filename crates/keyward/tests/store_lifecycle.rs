// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store lifecycle scenarios through the operation surface.

mod common;

use std::time::Duration;

use common::Harness;
use keyward::{
    Acl, AclEdit, AuthorizationTag, Credentials, Entry, KeyAlgorithm, KeywardError,
    ProcessContext, StoreName, StoreParams, Subject,
};
use keyward_test_utils::{ScriptedAgent, unsigned_process};

fn tool() -> ProcessContext {
    unsigned_process("/usr/bin/tool", 1)
}

fn root() -> ProcessContext {
    ProcessContext::new(1, 0, "/usr/sbin/keywardctl")
}

#[test]
fn wrong_passphrase_is_denied_and_the_right_one_still_works() {
    let h = Harness::builder().without_agent().build();
    let store = h.create_store("login", "correct horse");
    let copy = h.open_copy(store);
    assert!(h.keyward.is_locked(copy).unwrap());

    let err = h
        .keyward
        .unlock_store(copy, &Credentials::passphrase("battery staple"))
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(h.keyward.is_locked(copy).unwrap());

    h.keyward
        .unlock_store(copy, &Credentials::passphrase("correct horse"))
        .unwrap();
    assert!(!h.keyward.is_locked(copy).unwrap());
}

#[test]
fn future_blob_version_constructs_nothing() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    let mut blob = h.keyward.store_blob(store).unwrap().to_vec();
    blob[4..8].copy_from_slice(&99u32.to_be_bytes());
    let handles = h.keyward.open_handles();

    let err = h
        .keyward
        .open_store(StoreName::user("future"), &blob, &Credentials::none())
        .unwrap_err();
    assert!(matches!(err, KeywardError::IncompatibleBlobFormat { version: 99 }));
    assert_eq!(h.keyward.open_handles(), handles);
    assert_eq!(h.keyward.registry().len(), 1);
}

#[test]
fn failed_passphrase_change_leaves_the_blob_byte_identical() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    let before = h.keyward.store_blob(store).unwrap();

    let err = h
        .keyward
        .change_passphrase(
            store,
            &Credentials::passphrase("not it"),
            &Credentials::passphrase("new"),
        )
        .unwrap_err();
    assert!(matches!(err, KeywardError::AuthenticationDenied));
    assert_eq!(h.keyward.store_blob(store).unwrap(), before);
}

#[test]
fn canceled_new_passphrase_leaves_the_store_untouched() {
    let h = Harness::builder()
        .with_agent(ScriptedAgent::new().cancel_new_passphrase())
        .build();
    let store = h.create_store("login", "pw");
    let before = h.keyward.store_blob(store).unwrap();

    let err = h
        .keyward
        .change_passphrase(store, &Credentials::passphrase("pw"), &Credentials::none())
        .unwrap_err();
    assert!(err.is_user_canceled());
    assert_eq!(h.keyward.store_blob(store).unwrap(), before);
}

#[test]
fn changed_passphrase_unlocks_a_fresh_copy() {
    let h = Harness::new();
    let store = h.create_store("login", "old");
    h.keyward
        .change_passphrase(
            store,
            &Credentials::passphrase("old"),
            &Credentials::passphrase("new"),
        )
        .unwrap();

    let copy = h.open_copy(store);
    assert!(
        h.keyward
            .unlock_store(copy, &Credentials::passphrase("old"))
            .is_err()
    );
    h.keyward
        .unlock_store(copy, &Credentials::passphrase("new"))
        .unwrap();
}

#[test]
fn params_and_acl_round_trip_through_the_blob() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    let params = StoreParams {
        idle_timeout_secs: 17,
        lock_on_sleep: false,
    };
    h.keyward.set_params(store, params).unwrap();
    h.keyward
        .change_acl(
            store,
            AclEdit::Add(Entry::for_tags(
                [AuthorizationTag::Decrypt],
                Subject::prompted("read login items"),
            )),
            &Credentials::none(),
            &tool(),
        )
        .unwrap();

    let copy = h.open_copy(store);
    assert_eq!(h.keyward.get_params(copy).unwrap(), params);
    assert_eq!(h.keyward.get_acl(copy).unwrap(), h.keyward.get_acl(store).unwrap());
}

#[test]
fn every_acl_change_bumps_the_version() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    let version = h.keyward.store_version(store).unwrap();

    h.keyward
        .set_owner(store, Subject::prompted("owner"), &Credentials::none(), &tool())
        .unwrap();
    assert_eq!(h.keyward.store_version(store).unwrap(), version + 1);

    let err = h
        .keyward
        .change_acl(
            store,
            AclEdit::Remove { index: 7 },
            &Credentials::none(),
            &tool(),
        )
        .unwrap_err();
    // Unanswered owner prompt.
    assert!(err.is_user_canceled());
    assert_eq!(h.keyward.store_version(store).unwrap(), version + 1);
}

#[test]
fn invalid_edit_index_is_rejected() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    let err = h
        .keyward
        .change_acl(
            store,
            AclEdit::Remove { index: 7 },
            &Credentials::none(),
            &tool(),
        )
        .unwrap_err();
    assert!(matches!(err, KeywardError::InvalidAclSubjectValue(_)));
}

#[test]
fn after_lock_no_key_decodes_without_new_credentials() {
    let h = Harness::builder().without_agent().build();
    let store = h.create_store("login", "pw");
    let key = h
        .keyward
        .generate_key(
            store,
            KeyAlgorithm::Aes256,
            "wifi",
            Some(Acl::open()),
            &Credentials::none(),
            &tool(),
        )
        .unwrap();
    let blob = h.keyward.encode_key(key).unwrap();
    h.keyward.lock_store(store).unwrap();

    let decoded = h.keyward.decode_key(store, &blob).unwrap();
    for credentials in [Credentials::none(), Credentials::cancel()] {
        let err = h
            .keyward
            .validate_access(decoded, AuthorizationTag::Decrypt, &credentials, &tool())
            .unwrap_err();
        assert!(matches!(err, KeywardError::AuthenticationDenied));
    }

    h.keyward
        .validate_access(
            decoded,
            AuthorizationTag::Decrypt,
            &Credentials::passphrase("pw"),
            &tool(),
        )
        .unwrap();
}

#[test]
fn unknown_handles_are_not_found() {
    let h = Harness::new();
    let store = h.create_store("login", "pw");
    h.keyward.release_store(store).unwrap();
    assert!(matches!(
        h.keyward.lock_store(store),
        Err(KeywardError::NotFound { kind: "store", .. })
    ));
}

#[test]
fn sleep_respects_lock_on_sleep_and_lock_all_does_not() {
    let h = Harness::new();
    let sleepy = h.create_store("sleepy", "pw");
    let awake = h.create_store("awake", "pw");
    h.keyward
        .set_params(
            awake,
            StoreParams {
                idle_timeout_secs: 0,
                lock_on_sleep: false,
            },
        )
        .unwrap();

    h.keyward.system_will_sleep();
    assert!(h.keyward.is_locked(sleepy).unwrap());
    assert!(!h.keyward.is_locked(awake).unwrap());

    h.keyward.lock_all();
    assert!(h.keyward.is_locked(awake).unwrap());
}

#[test]
fn system_store_unlocks_from_the_key_file_only() {
    let h = Harness::new();
    let store = h
        .keyward
        .create_store(
            StoreName::system("System"),
            None,
            &Credentials::passphrase("system secret"),
            None,
        )
        .unwrap();

    let err = h
        .keyward
        .write_system_keyfile(store, &Credentials::none(), &tool())
        .unwrap_err();
    assert!(matches!(err, KeywardError::PermissionDenied(_)));
    h.keyward
        .write_system_keyfile(store, &Credentials::none(), &root())
        .unwrap();
    assert!(h.keyfile.exists());

    let blob = h.keyward.store_blob(store).unwrap();
    let copy = h
        .keyward
        .open_store(StoreName::system("System copy"), &blob, &Credentials::none())
        .unwrap();
    h.keyward.unlock_store(copy, &Credentials::none()).unwrap();
    assert_eq!(h.agent.passphrase_prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn activity_within_the_timeout_never_locks() {
    let h = Harness::builder().with_idle_timers().build();
    let store = h
        .keyward
        .create_store(
            StoreName::user("timed"),
            Some(StoreParams {
                idle_timeout_secs: 10,
                lock_on_sleep: true,
            }),
            &Credentials::passphrase("pw"),
            None,
        )
        .unwrap();

    for _ in 0..20 {
        tokio::time::sleep(Duration::from_secs(9)).await;
        h.keyward.activity(store).unwrap();
    }
    assert!(!h.keyward.is_locked(store).unwrap());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(h.keyward.is_locked(store).unwrap());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.keyward.store(store).unwrap().lock_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn operations_count_as_activity() {
    let h = Harness::builder().with_idle_timers().build();
    let store = h
        .keyward
        .create_store(
            StoreName::user("timed"),
            Some(StoreParams {
                idle_timeout_secs: 10,
                lock_on_sleep: true,
            }),
            &Credentials::passphrase("pw"),
            None,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(8)).await;
    h.keyward
        .validate_access(store, AuthorizationTag::Decrypt, &Credentials::none(), &tool())
        .unwrap();
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert!(!h.keyward.is_locked(store).unwrap());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.keyward.is_locked(store).unwrap());
}
