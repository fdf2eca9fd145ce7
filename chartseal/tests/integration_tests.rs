//! Integration tests for chartseal with the in-memory store.

use chartseal::accounts::{AccountRegistry, NewAccount, Role};
use chartseal::audit::{Actor, AuditTrail, LogQuery, VerifyOutcome};
use chartseal::codec::FieldCodec;
use chartseal::error::Error;
use chartseal::index::digest;
use chartseal::keyring::{generate_signing_keypair, CipherKey};
use chartseal::lookup::equality_filter;
use chartseal::migrate::{canonical_changes, migrate_record};
use chartseal::patients::{ChartUpdate, PatientDirectory};
use chartseal::policy::{ACTIVITY_LOGS, PATIENTS, USERS};
use chartseal::signer::AuditSigner;
use chartseal::store::{Document, FindOptions, RecordStore};
use chartseal_store_mem::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;

const TEST_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

fn active_codec() -> FieldCodec {
    FieldCodec::new(CipherKey::parse(Some(TEST_KEY)))
}

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_record_constraints())
}

fn doc(pairs: &[(&str, Value)]) -> Document {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

fn new_patient(hospital_id: &str) -> NewAccount {
    NewAccount {
        hospital_id: hospital_id.to_string(),
        password: "correct horse".to_string(),
        name: "Ada Lovelace".to_string(),
        email: "Ada@Example.com".to_string(),
        phone_number: Some("555-0100".to_string()),
        role: None,
    }
}

#[tokio::test]
async fn test_signup_lookup_and_chart_round_trip() {
    let store = store();
    let codec = active_codec();
    let registry = AccountRegistry::new(store.clone(), codec.clone());
    let charts = PatientDirectory::new(store.clone(), codec.clone());

    let account = registry.register(new_patient("H100")).await.expect("register");
    assert_eq!(account.hospital_id, "H100");
    assert_eq!(account.role, Role::Patient);

    // Stored form carries no plaintext identifier.
    let raw = store
        .find_one("users", &equality_filter(USERS.field("HospitalID").unwrap(), "H100").unwrap())
        .await
        .expect("query")
        .expect("record");
    assert!(!raw.document.contains_key("HospitalID"));
    assert_eq!(raw.document.get("HospitalIDHash"), Some(&json!(digest("H100"))));

    // Registration bootstrapped a chart; fill and read it back.
    charts
        .update_chart(
            "H100",
            ChartUpdate {
                blood_type: Some("o-".to_string()),
                medical_history: Some(vec![json!({"visit": "2024-11-02", "notes": "intake"})]),
            },
        )
        .await
        .expect("update chart");

    let chart = charts.find("h100 ").await.expect("find").expect("chart");
    assert_eq!(chart.hospital_id, "H100");
    assert_eq!(chart.blood_type.as_deref(), Some("O-"));
    assert_eq!(chart.medical_history, vec![json!({"notes": "intake", "visit": "2024-11-02"})]);
}

#[tokio::test]
async fn test_duplicate_identifier_rejected() {
    let store = store();
    let registry = AccountRegistry::new(store, active_codec());

    registry.register(new_patient("H200")).await.expect("first registration");

    // Casing drift collides at the surrogate layer.
    let duplicate = registry.register(new_patient(" h200 ")).await;
    assert!(matches!(duplicate, Err(Error::IdentifierInUse)));
}

#[tokio::test]
async fn test_racing_writers_resolved_by_store_constraint() {
    let store = store();
    let codec = active_codec();

    // Two writers that both passed the read probe still cannot both land:
    // the surrogate unique constraint rejects the loser.
    let encode = |id: &str| {
        codec.encode(
            &USERS,
            &doc(&[("HospitalID", json!(id)), ("role", json!("patient"))]),
            chartseal::codec::LegacyDisposition::Remove,
        )
    };
    store.insert("users", encode("H300")).await.expect("winner");
    let loser = store.insert("users", encode("H300")).await;
    assert!(matches!(
        loser,
        Err(chartseal::error::StoreError::UniqueViolation { ref column, .. })
            if column == "HospitalIDHash"
    ));
}

#[tokio::test]
async fn test_one_query_matches_three_storage_generations() {
    let store = store();
    let spec = USERS.field("HospitalID").unwrap();

    // Legacy plaintext, interim digest-in-plaintext-column, canonical.
    store
        .insert("users", doc(&[("HospitalID", json!("H001")), ("era", json!("legacy"))]))
        .await
        .expect("legacy");
    store
        .insert("users", doc(&[("HospitalID", json!(digest("H001"))), ("era", json!("interim"))]))
        .await
        .expect("interim");
    store
        .insert(
            "users",
            doc(&[("HospitalIDHash", json!(digest("H001"))), ("era", json!("canonical"))]),
        )
        .await
        .expect("canonical");

    let filter = equality_filter(spec, "H001").unwrap();
    let matched = store
        .find_many("users", Some(&filter), FindOptions::default())
        .await
        .expect("query");
    assert_eq!(matched.len(), 3);

    let other = equality_filter(spec, "H002").unwrap();
    let unmatched = store
        .find_many("users", Some(&other), FindOptions::default())
        .await
        .expect("query");
    assert!(unmatched.is_empty());
}

#[tokio::test]
async fn test_authentication_migrates_legacy_record() {
    let store = store();
    let codec = active_codec();
    let registry = AccountRegistry::new(store.clone(), codec.clone());

    // A pre-migration record: plaintext columns, hashed credential.
    let password_hash = chartseal::credential::hash_password("legacy pass").unwrap();
    store
        .insert(
            "users",
            doc(&[
                ("HospitalID", json!("H400")),
                ("name", json!("Grace Hopper")),
                ("email", json!("grace@example.com")),
                ("role", json!("doctor")),
                ("password", json!(password_hash)),
            ]),
        )
        .await
        .expect("seed legacy record");

    let account = registry.authenticate("h400", "legacy pass").await.expect("authenticate");
    assert_eq!(account.hospital_id, "H400");
    assert_eq!(account.role, Role::Doctor);
    assert_eq!(account.name.as_deref(), Some("Grace Hopper"));

    // The read upgraded the record to the canonical generation.
    let spec = USERS.field("HospitalID").unwrap();
    let migrated = store
        .find_one("users", &equality_filter(spec, "H400").unwrap())
        .await
        .expect("query")
        .expect("record");
    assert!(!migrated.document.contains_key("HospitalID"));
    assert_eq!(migrated.document.get("HospitalIDHash"), Some(&json!(digest("H400"))));
    assert!(migrated.document.contains_key("HospitalIDEncrypted"));
    // Credential hash is untouched by migration.
    assert!(migrated.document.contains_key("password"));

    // Idempotence: a second pass computes zero changes.
    assert!(canonical_changes(&codec, &USERS, &migrated.document).is_empty());

    // And a second authentication still works against the canonical form.
    let again = registry.authenticate("H400", "legacy pass").await.expect("re-authenticate");
    assert_eq!(again.hospital_id, "H400");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_identifier_are_indistinguishable() {
    let store = store();
    let registry = AccountRegistry::new(store, active_codec());
    registry.register(new_patient("H500")).await.expect("register");

    let wrong_password = registry.authenticate("H500", "wrong").await;
    let unknown = registry.authenticate("H999", "correct horse").await;
    assert!(matches!(wrong_password, Err(Error::InvalidCredentials)));
    assert!(matches!(unknown, Err(Error::InvalidCredentials)));
}

#[tokio::test]
async fn test_patient_find_migrates_legacy_chart() {
    let store = store();
    let codec = active_codec();
    let charts = PatientDirectory::new(store.clone(), codec.clone());

    store
        .insert(
            "patients",
            doc(&[
                ("HospitalID", json!("H600")),
                ("bloodType", json!("AB+")),
                ("medicalHistory", json!([{"visit": "2019-05-20"}])),
            ]),
        )
        .await
        .expect("seed legacy chart");

    let chart = charts.find("H600").await.expect("find").expect("chart");
    assert_eq!(chart.blood_type.as_deref(), Some("AB+"));
    assert_eq!(chart.medical_history, vec![json!({"visit": "2019-05-20"})]);

    let spec = PATIENTS.field("HospitalID").unwrap();
    let migrated = store
        .find_one("patients", &equality_filter(spec, "H600").unwrap())
        .await
        .expect("query")
        .expect("record");
    assert!(!migrated.document.contains_key("bloodType"));
    assert!(migrated.document.contains_key("bloodTypeEncrypted"));
    assert!(canonical_changes(&codec, &PATIENTS, &migrated.document).is_empty());
}

#[tokio::test]
async fn test_summary_attachment_round_trip() {
    let store = store();
    let codec = active_codec();
    let registry = AccountRegistry::new(store.clone(), codec.clone());
    let charts = PatientDirectory::new(store.clone(), codec.clone());

    registry.register(new_patient("H700")).await.expect("register");
    charts
        .attach_summary("H700", "Stable vitals; follow-up in six months.")
        .await
        .expect("attach summary");

    let chart = charts.find("H700").await.expect("find").expect("chart");
    assert_eq!(chart.ai_summary.as_deref(), Some("Stable vitals; follow-up in six months."));

    // The summary is encrypt-only: a token, no surrogate.
    let spec = PATIENTS.field("HospitalID").unwrap();
    let raw = store
        .find_one("patients", &equality_filter(spec, "H700").unwrap())
        .await
        .expect("query")
        .expect("record");
    assert!(raw.document.contains_key("aiSummaryEncrypted"));
    assert!(!raw.document.contains_key("aiSummaryHash"));
    assert!(!raw.document.contains_key("aiSummary"));
}

#[tokio::test]
async fn test_degraded_mode_end_to_end() {
    let store = store();
    let codec = FieldCodec::new(CipherKey::Disabled);
    let registry = AccountRegistry::new(store.clone(), codec.clone());
    let charts = PatientDirectory::new(store.clone(), codec.clone());

    let account = registry.register(new_patient("H800")).await.expect("register");
    assert_eq!(account.hospital_id, "H800");

    charts
        .update_chart("H800", ChartUpdate { blood_type: Some("B-".to_string()), ..Default::default() })
        .await
        .expect("update chart");

    let chart = charts.find("H800").await.expect("find").expect("chart");
    assert_eq!(chart.blood_type.as_deref(), Some("B-"));

    let authenticated = registry.authenticate("H800", "correct horse").await.expect("login");
    assert_eq!(authenticated.hospital_id, "H800");
}

#[tokio::test]
async fn test_audit_trail_signed_round_trip() {
    let store = store();
    let codec = active_codec();
    let pair = generate_signing_keypair().expect("keypair");
    let trail = AuditTrail::new(
        store.clone(),
        codec.clone(),
        AuditSigner::from_pem(Some(&pair.private_pem)),
    );

    let actor = Actor { hospital_id: "H100".to_string(), role: Role::Doctor };
    trail
        .record("chart.read", Some(&actor), json!({"chart": "H100"}), Some("10.1.2.3"))
        .await
        .expect("detached write");

    let records = store
        .find_many("activity_logs", None, FindOptions::default())
        .await
        .expect("list");
    assert_eq!(records.len(), 1);
    let entry = &records[0].document;

    assert_eq!(trail.verify(entry), VerifyOutcome::Valid);

    // Any single-byte mutation of the canonical payload breaks the seal.
    let mut tampered = entry.clone();
    tampered.insert("userHospitalIDHash".to_string(), json!(digest("H101")));
    assert_eq!(trail.verify(&tampered), VerifyOutcome::Tampered);
}

#[tokio::test]
async fn test_audit_without_signer_is_unattributed_but_persisted() {
    let store = store();
    let trail = AuditTrail::new(store.clone(), active_codec(), AuditSigner::Disabled);

    trail
        .record("login", None, json!({"ok": false}), None)
        .await
        .expect("detached write");

    let records = store
        .find_many("activity_logs", None, FindOptions::default())
        .await
        .expect("list");
    assert_eq!(records.len(), 1);
    let entry = &records[0].document;
    assert!(!entry.contains_key("signatureEncrypted"));
    assert_eq!(trail.verify(entry), VerifyOutcome::Unattributed);
}

#[tokio::test]
async fn test_audit_listing_filters_by_action_and_role_surrogate() {
    let store = store();
    let codec = active_codec();
    let trail = AuditTrail::new(store.clone(), codec.clone(), AuditSigner::Disabled);

    let doctor = Actor { hospital_id: "H100".to_string(), role: Role::Doctor };
    let admin = Actor { hospital_id: "H900".to_string(), role: Role::Admin };
    trail.record("login", Some(&doctor), json!({}), None).await.expect("write");
    trail.record("chart.read", Some(&doctor), json!({}), None).await.expect("write");
    trail.record("login", Some(&admin), json!({}), None).await.expect("write");

    // Action equality filter uses the lookup disjunction.
    let views = trail
        .recent(&LogQuery { action: Some("login".to_string()), limit: None })
        .await
        .expect("recent");
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|view| view.action.as_deref() == Some("login")));
    // Newest first.
    assert_eq!(views[0].actor_id.as_deref(), Some("H900"));

    // Hash-only role: filterable by digest, never decrypted.
    let spec = ACTIVITY_LOGS.field("userRole").unwrap();
    let doctor_filter = equality_filter(spec, "Doctor").unwrap();
    let doctor_entries = store
        .find_many("activity_logs", Some(&doctor_filter), FindOptions::default())
        .await
        .expect("filter by role");
    assert_eq!(doctor_entries.len(), 2);
    for record in &doctor_entries {
        assert_eq!(record.document.get("userRoleHash"), Some(&json!(digest("doctor"))));
        assert!(!record.document.contains_key("userRoleEncrypted"));
    }
}

#[tokio::test]
async fn test_shim_is_noop_on_fresh_records() {
    let store = store();
    let codec = active_codec();
    let registry = AccountRegistry::new(store.clone(), codec.clone());
    registry.register(new_patient("H950")).await.expect("register");

    let spec = USERS.field("HospitalID").unwrap();
    let record = store
        .find_one("users", &equality_filter(spec, "H950").unwrap())
        .await
        .expect("query")
        .expect("record");

    let rewritten = migrate_record(&codec, &USERS, store.as_ref(), &record).await;
    assert!(!rewritten);
}

#[tokio::test]
async fn test_account_find_projects_public_fields_only() {
    let store = store();
    let registry = AccountRegistry::new(store, active_codec());
    registry.register(new_patient("H110")).await.expect("register");

    let account = registry.find(" h110").await.expect("find").expect("account");
    assert_eq!(account.hospital_id, "H110");
    assert_eq!(account.name.as_deref(), Some("Ada Lovelace"));
    // Email was normalized to lowercase at write time.
    assert_eq!(account.email.as_deref(), Some("ada@example.com"));
    assert_eq!(account.phone_number.as_deref(), Some("555-0100"));

    assert!(registry.find("H999").await.expect("find").is_none());
}

#[tokio::test]
async fn test_roster_and_removal() {
    let store = store();
    let codec = active_codec();
    let registry = AccountRegistry::new(store.clone(), codec.clone());
    let charts = PatientDirectory::new(store.clone(), codec.clone());

    registry.register(new_patient("H120")).await.expect("register");
    registry.register(new_patient("H121")).await.expect("register");

    let roster = charts.roster().await.expect("roster");
    assert_eq!(roster.len(), 2);
    // Newest first.
    assert_eq!(roster[0].hospital_id, "H121");

    charts.remove("H120").await.expect("remove");
    assert_eq!(charts.roster().await.expect("roster").len(), 1);
    assert!(matches!(charts.remove("H120").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_key_config_wires_codec_and_trail() {
    let pair = generate_signing_keypair().expect("keypair");
    let keys = chartseal::keyring::KeyConfig::new(
        CipherKey::parse(Some(TEST_KEY)),
        AuditSigner::from_pem(Some(&pair.private_pem)),
    );

    let store = store();
    let codec = FieldCodec::new(keys.cipher);
    let trail = AuditTrail::new(store.clone(), codec.clone(), keys.signer);

    trail.record("config.check", None, json!({}), None).await.expect("write");
    let records = store
        .find_many("activity_logs", None, FindOptions::default())
        .await
        .expect("list");
    assert_eq!(trail.verify(&records[0].document), VerifyOutcome::Valid);
}
