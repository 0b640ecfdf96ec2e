//! Adapter behavior over the in-process credential store: generation,
//! normalization, default selection, enumeration, deletion.

use std::sync::Arc;
use vox_keys::{
    error::{KeyError, Result},
    fingerprint, CredentialRecord, CredentialStore, IdentityStore, MemoryCredentialStore,
    MemoryDefaults,
};

fn new_adapter() -> Result<(IdentityStore, Arc<MemoryCredentialStore>)> {
    let store = Arc::new(MemoryCredentialStore::new());
    let defaults = Arc::new(MemoryDefaults::new());
    let adapter = IdentityStore::new(store.clone(), defaults)?;
    Ok((adapter, store))
}

#[test]
fn generated_identity_is_already_normalized() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let r = adapter.generate_self_signed("Alice", "alice@example.com")?;
    assert_eq!(adapter.normalize(&r)?, Some(r.clone()));
    assert_eq!(adapter.list_identity_refs()?, vec![r.clone()]);

    let cert = adapter
        .resolve_certificate(&r)?
        .expect("generated identity must resolve");
    assert_eq!(cert.common_name().as_deref(), Some("Alice"));
    assert_eq!(cert.email().as_deref(), Some("alice@example.com"));
    assert!(cert.not_after()? > cert.not_before()?);

    // The certificate digest round-trips through the fingerprint text format.
    let display = fingerprint::from_hex(&cert.hex_digest())?;
    assert_eq!(fingerprint::to_digest(&display)?, cert.digest().to_vec());

    Ok(())
}

#[test]
fn each_generation_produces_a_fresh_identity() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let a = adapter.generate_self_signed("Alice", "alice@example.com")?;
    let b = adapter.generate_self_signed("Alice", "alice@example.com")?;
    assert_ne!(a, b);

    let cert_a = adapter.resolve_certificate(&a)?.unwrap();
    let cert_b = adapter.resolve_certificate(&b)?.unwrap();
    assert_ne!(cert_a.hex_digest(), cert_b.hex_digest());

    Ok(())
}

#[test]
fn deleting_the_default_clears_the_selection() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let r = adapter.generate_self_signed("Bob", "bob@example.com")?;
    adapter.set_default(&r)?;
    assert_eq!(adapter.get_default()?, Some(r.clone()));
    assert!(adapter.default_certificate()?.is_some());

    adapter.delete_identity(&r)?;
    assert_eq!(adapter.get_default()?, None);
    assert!(adapter.default_certificate()?.is_none());
    assert!(adapter.resolve_certificate(&r)?.is_none());

    Ok(())
}

#[test]
fn deleting_a_non_default_identity_keeps_the_selection() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let keep = adapter.generate_self_signed("Keep", "keep@example.com")?;
    let discard = adapter.generate_self_signed("Drop", "drop@example.com")?;
    adapter.set_default(&keep)?;

    adapter.delete_identity(&discard)?;
    assert_eq!(adapter.get_default()?, Some(keep));

    Ok(())
}

#[test]
fn delete_reports_not_found_for_stale_refs() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let r = adapter.generate_self_signed("Gone", "gone@example.com")?;
    adapter.delete_identity(&r)?;

    match adapter.delete_identity(&r) {
        Err(KeyError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    // Stale refs resolve to absent, never an error.
    assert!(adapter.resolve_certificate(&r)?.is_none());
    assert_eq!(adapter.normalize(&r)?, None);

    Ok(())
}

#[test]
fn set_default_rejects_unresolvable_refs() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let r = adapter.generate_self_signed("Ephemeral", "e@example.com")?;
    adapter.delete_identity(&r)?;

    match adapter.set_default(&r) {
        Err(KeyError::NotAnIdentity(_)) => {}
        other => panic!("expected NotAnIdentity, got {other:?}"),
    }
    assert_eq!(adapter.get_default()?, None);

    Ok(())
}

#[test]
fn bare_certificates_normalize_to_their_identity() -> Result<()> {
    let (adapter, store) = new_adapter()?;

    let identity_ref = adapter.generate_self_signed("Carol", "carol@example.com")?;
    let cert = adapter.resolve_certificate(&identity_ref)?.unwrap();

    // Simulate external store mutation: a bare certificate record with the
    // same leaf lands in the store.
    let cert_ref = store.insert(CredentialRecord::certificate_only(vec![cert])?)?;

    let normalized = adapter.normalize(&cert_ref)?;
    assert_eq!(normalized, Some(identity_ref.clone()));

    // Idempotent: normalizing the result is a fixpoint.
    assert_eq!(adapter.normalize(&identity_ref)?, Some(identity_ref.clone()));

    // Bare certificates never show up in the identity enumeration, but the
    // cert ref is accepted as a default because it normalizes.
    assert_eq!(adapter.list_identity_refs()?, vec![identity_ref.clone()]);
    adapter.set_default(&cert_ref)?;
    assert_eq!(adapter.get_default()?, Some(identity_ref));

    Ok(())
}

#[test]
fn orphaned_certificates_are_never_identities() -> Result<()> {
    let (adapter, store) = new_adapter()?;

    // A certificate with no matching private key anywhere in the store.
    let foreign = IdentityStore::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemoryDefaults::new()),
    )?;
    let foreign_ref = foreign.generate_self_signed("Foreign", "f@example.com")?;
    let foreign_cert = foreign.resolve_certificate(&foreign_ref)?.unwrap();

    let cert_ref = store.insert(CredentialRecord::certificate_only(vec![foreign_cert])?)?;
    assert_eq!(adapter.normalize(&cert_ref)?, None);

    match adapter.set_default(&cert_ref) {
        Err(KeyError::NotAnIdentity(_)) => {}
        other => panic!("expected NotAnIdentity, got {other:?}"),
    }
    match adapter.client_credentials(&cert_ref) {
        Err(KeyError::NotAnIdentity(_)) => {}
        other => panic!("expected NotAnIdentity, got {:?}", other.err()),
    }

    Ok(())
}

#[test]
fn find_identity_by_name_matches_common_name() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let alice = adapter.generate_self_signed("Alice", "alice@example.com")?;
    let _bob = adapter.generate_self_signed("Bob", "bob@example.com")?;

    assert_eq!(adapter.find_identity_by_name("Alice")?, Some(alice));
    assert_eq!(adapter.find_identity_by_name("Nobody")?, None);

    Ok(())
}

#[test]
fn client_credentials_hand_off_chain_and_key() -> Result<()> {
    let (adapter, _store) = new_adapter()?;

    let r = adapter.generate_self_signed("Dave", "dave@example.com")?;
    let (chain, key) = adapter.client_credentials(&r)?;

    assert_eq!(chain.len(), 1);
    assert!(!chain[0].as_ref().is_empty());
    assert!(matches!(key, rustls_pki_types::PrivateKeyDer::Pkcs8(_)));

    Ok(())
}

#[test]
fn stale_persisted_default_is_dropped_on_construction() -> Result<()> {
    let store = Arc::new(MemoryCredentialStore::new());
    let defaults = Arc::new(MemoryDefaults::new());

    let adapter = IdentityStore::new(store.clone(), defaults.clone())?;
    let r = adapter.generate_self_signed("Transient", "t@example.com")?;
    adapter.set_default(&r)?;
    drop(adapter);

    // The credential disappears behind the adapter's back.
    store.delete(&r)?;

    let reopened = IdentityStore::new(store, defaults)?;
    assert_eq!(reopened.get_default()?, None);

    Ok(())
}
