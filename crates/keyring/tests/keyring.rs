use coffer_keyring::auth::mock::MockDriver;
use coffer_keyring::{AuthStore, CancelToken, Error, Key, Keyring, SecretKey, Status, now_ms};
use tempfile::TempDir;

fn new_keyring(dir: &TempDir) -> Keyring {
    let auth = AuthStore::open(dir.path().join("auth.db"), None).expect("open auth store");
    Keyring::new(dir.path().join("keyring.db"), auth).expect("new keyring")
}

#[test]
fn test_setup_lock_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    let mk = SecretKey::generate();

    assert!(matches!(kr.unlock(&mk), Err(Error::SetupNeeded)));
    assert_eq!(kr.status(), Status::SetupNeeded);

    kr.setup(&mk).unwrap();
    assert_eq!(kr.status(), Status::Unlocked);
    assert!(matches!(kr.setup(&mk), Err(Error::AlreadyUnlocked)));
    kr.lock().unwrap();

    assert!(matches!(kr.setup(&mk), Err(Error::AlreadySetup)));

    // Unlock multiple times
    kr.unlock(&mk).unwrap();
    assert_eq!(kr.status(), Status::Unlocked);
    kr.unlock(&mk).unwrap();

    // Lock, unlock
    kr.lock().unwrap();
    assert_eq!(kr.status(), Status::Locked);
    kr.unlock(&mk).unwrap();
}

#[test]
fn test_unlock_with_wrong_master_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    let mk = SecretKey::generate();

    kr.setup(&mk).unwrap();
    kr.lock().unwrap();

    let wrong = SecretKey::generate();
    assert!(matches!(kr.unlock(&wrong), Err(Error::InvalidAuth)));
    assert_eq!(kr.status(), Status::Locked);

    kr.unlock(&mk).unwrap();
    assert_eq!(kr.status(), Status::Unlocked);
}

#[test]
fn test_password_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);

    assert_eq!(kr.status(), Status::SetupNeeded);
    let mk = kr.setup_password("testpassword").unwrap();
    assert_eq!(kr.status(), Status::Unlocked);

    kr.lock().unwrap();
    assert_eq!(kr.status(), Status::Locked);

    assert!(matches!(
        kr.unlock_with_password("invalidpassword"),
        Err(Error::InvalidAuth)
    ));
    assert_eq!(kr.status(), Status::Locked);

    let recovered = kr.unlock_with_password("testpassword").unwrap();
    assert_eq!(kr.status(), Status::Unlocked);
    assert_eq!(recovered, mk);
}

#[test]
fn test_keys_survive_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    kr.setup_password("testpassword").unwrap();

    let ts = now_ms();
    let mut key = Key::new("kex1w9d3yle4gnqcvrr9nhmt6i9licjkp5cuthli4nuig6jvo7cxa6aqcx4ihg", "edx25519")
        .with_labels(&["test"])
        .created(ts)
        .updated(ts);
    key.private = Some(vec![1; 32]);
    key.public = Some(vec![2; 32]);
    kr.set(&key).unwrap();

    kr.lock().unwrap();
    kr.unlock_with_password("testpassword").unwrap();

    let got = kr.get_or_fail(&key.id).unwrap();
    assert_eq!(got, key);

    let by_label = kr.list_by_label("test").unwrap();
    assert_eq!(by_label, vec![key.clone()]);
    assert!(kr.list_by_label("tes").unwrap().is_empty());

    let single = kr.get_by_label("test").unwrap().unwrap();
    assert_eq!(single.id, key.id);
}

#[test]
fn test_register_paper_key_while_unlocked() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);

    let mk = kr.setup_password("testpassword").unwrap();
    kr.register_paper_key("chill pencil wool kite snow brick").unwrap();

    let mut ids: Vec<_> = kr.auth().list().unwrap().into_iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["paperkey", "password"]);

    kr.lock().unwrap();
    let recovered = kr
        .unlock_with_paper_key("chill pencil wool kite snow brick")
        .unwrap();
    assert_eq!(recovered, mk);
    assert_eq!(kr.status(), Status::Unlocked);
}

#[test]
fn test_register_requires_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);

    kr.setup_password("testpassword").unwrap();
    kr.lock().unwrap();

    assert!(matches!(kr.register_password("other"), Err(Error::Locked)));
    assert!(matches!(kr.register_paper_key("words"), Err(Error::Locked)));
}

#[test]
fn test_locked_operations_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);

    kr.setup_password("testpassword").unwrap();
    kr.lock().unwrap();

    let key = Key::new("kex1abc", "edx25519");
    assert!(matches!(kr.get("kex1abc"), Err(Error::Locked)));
    assert!(matches!(kr.get_or_fail("kex1abc"), Err(Error::Locked)));
    assert!(matches!(kr.list(), Err(Error::Locked)));
    assert!(matches!(kr.set(&key), Err(Error::Locked)));
    assert!(matches!(kr.remove("kex1abc"), Err(Error::Locked)));
    assert!(matches!(kr.list_by_label("test"), Err(Error::Locked)));
}

#[test]
fn test_get_missing_and_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    kr.setup_password("testpassword").unwrap();

    assert!(kr.get("kex1missing").unwrap().is_none());
    assert!(matches!(kr.get_or_fail("kex1missing"), Err(Error::NotFound(_))));
}

#[test]
fn test_set_last_write_wins_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    kr.setup_password("testpassword").unwrap();

    let mut key = Key::new("kex1abc", "edx25519").created(now_ms());
    kr.set(&key).unwrap();
    key.notes = "rotated".to_string();
    key.updated_at = now_ms();
    kr.set(&key).unwrap();

    let got = kr.get("kex1abc").unwrap().unwrap();
    assert_eq!(got.notes, "rotated");
    assert_eq!(kr.list().unwrap().len(), 1);

    kr.remove("kex1abc").unwrap();
    assert!(kr.get("kex1abc").unwrap().is_none());
}

#[test]
fn test_get_by_label_ambiguity() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    kr.setup_password("testpassword").unwrap();

    kr.set(&Key::new("kex1a", "edx25519").with_labels(&["shared"])).unwrap();
    assert!(kr.get_by_label("shared").unwrap().is_some());

    kr.set(&Key::new("kex1b", "edx25519").with_labels(&["shared"])).unwrap();
    assert_eq!(kr.list_by_label("shared").unwrap().len(), 2);
    assert!(matches!(kr.get_by_label("shared"), Err(Error::AmbiguousLabel(_))));

    assert!(kr.get_by_label("unused").unwrap().is_none());
}

#[test]
fn test_fido2_two_credentials_unlock_same_master_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    let mut driver = MockDriver::new();
    driver.add_device("/dev/hidraw0");
    driver.add_device("/dev/hidraw1");
    kr.set_fido2_driver(Box::new(driver));
    let cancel = CancelToken::new();

    let hs1 = kr
        .generate_hmac_secret(Some("12345"), "/dev/hidraw0", "coffer/tests", &cancel)
        .unwrap();
    let mk = kr.setup_hmac_secret(&hs1, Some("12345"), &cancel).unwrap();

    let hs2 = kr
        .generate_hmac_secret(Some("12345"), "/dev/hidraw1", "coffer/tests", &cancel)
        .unwrap();
    kr.register_hmac_secret(&hs2, Some("12345"), &cancel).unwrap();

    kr.lock().unwrap();
    let recovered = kr.unlock_with_hmac_secret(Some("12345"), &cancel).unwrap();
    assert_eq!(recovered, mk);

    // Drop the first enrollment; the second credential still recovers
    // the same master key.
    kr.lock().unwrap();
    kr.auth_mut().delete(&hex::encode(&hs1.credential_id)).unwrap();
    let recovered = kr.unlock_with_hmac_secret(Some("12345"), &cancel).unwrap();
    assert_eq!(recovered, mk);
}

#[test]
fn test_hardware_operations_require_driver() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    let cancel = CancelToken::new();

    assert!(matches!(kr.fido2_devices(&cancel), Err(Error::NoFido2Driver)));
    assert!(matches!(
        kr.generate_hmac_secret(None, "", "coffer/tests", &cancel),
        Err(Error::NoFido2Driver)
    ));
    assert!(matches!(
        kr.unlock_with_hmac_secret(None, &cancel),
        Err(Error::NoFido2Driver)
    ));
}

#[test]
fn test_reset_not_implemented() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    assert!(matches!(kr.reset(), Err(Error::NotImplemented)));
}

#[test]
fn test_master_key_retained_until_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);

    assert!(kr.master_key().is_none());
    let mk = kr.setup_password("testpassword").unwrap();
    assert_eq!(kr.master_key(), Some(&mk));

    kr.lock().unwrap();
    assert!(kr.master_key().is_none());
}

#[test]
fn test_vault_config_upsert() {
    let dir = tempfile::tempdir().unwrap();
    let mut kr = new_keyring(&dir);
    kr.setup_password("testpassword").unwrap();

    assert_eq!(kr.get_config("key1").unwrap(), None);
    kr.set_config("key1", "val1").unwrap();
    kr.set_config("key1", "val1.2").unwrap();
    assert_eq!(kr.get_config("key1").unwrap(), Some("val1.2".to_string()));
}
