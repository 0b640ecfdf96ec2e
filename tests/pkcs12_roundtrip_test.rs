//! PKCS#12 export/import: round-trip fidelity and error discrimination.

use std::sync::Arc;
use vox_keys::{
    error::{KeyError, Result},
    CredentialRecord, CredentialStore, IdentityStore, MemoryCredentialStore, MemoryDefaults,
};

fn new_adapter() -> Result<(IdentityStore, Arc<MemoryCredentialStore>)> {
    let store = Arc::new(MemoryCredentialStore::new());
    let defaults = Arc::new(MemoryDefaults::new());
    let adapter = IdentityStore::new(store.clone(), defaults)?;
    Ok((adapter, store))
}

#[test]
fn export_import_roundtrip_preserves_the_identity() -> Result<()> {
    let (source, _) = new_adapter()?;
    let (destination, _) = new_adapter()?;

    let r = source.generate_self_signed("Alice", "alice@example.com")?;
    let original = source.resolve_certificate(&r)?.unwrap();

    let p12 = source.export_pkcs12(&r, "hunter2")?;
    assert!(!p12.is_empty());

    let imported_ref = destination.import_pkcs12(&p12, "hunter2")?;
    let imported = destination.resolve_certificate(&imported_ref)?.unwrap();

    assert_eq!(imported.common_name().as_deref(), Some("Alice"));
    assert_eq!(imported.hex_digest(), original.hex_digest());

    // The imported credential is a full identity, usable as-is.
    assert_eq!(
        destination.normalize(&imported_ref)?,
        Some(imported_ref.clone())
    );
    assert_eq!(destination.list_identity_refs()?, vec![imported_ref]);

    Ok(())
}

#[test]
fn wrong_password_is_distinguished_from_malformed_input() -> Result<()> {
    let (adapter, _) = new_adapter()?;

    let r = adapter.generate_self_signed("Alice", "alice@example.com")?;
    let p12 = adapter.export_pkcs12(&r, "hunter2")?;

    let (fresh, _) = new_adapter()?;
    match fresh.import_pkcs12(&p12, "wrongpass") {
        Err(KeyError::WrongPassword) => {}
        other => panic!("expected WrongPassword, got {:?}", other.err()),
    }

    match fresh.import_pkcs12(b"not a pkcs12 container", "hunter2") {
        Err(KeyError::MalformedContainer(_)) => {}
        other => panic!("expected MalformedContainer, got {:?}", other.err()),
    }

    Ok(())
}

#[test]
fn duplicate_import_is_a_store_insertion_failure() -> Result<()> {
    let (source, _) = new_adapter()?;
    let (destination, _) = new_adapter()?;

    let r = source.generate_self_signed("Alice", "alice@example.com")?;
    let p12 = source.export_pkcs12(&r, "hunter2")?;

    destination.import_pkcs12(&p12, "hunter2")?;
    match destination.import_pkcs12(&p12, "hunter2") {
        Err(KeyError::StoreInsertionFailure(_)) => {}
        other => panic!("expected StoreInsertionFailure, got {:?}", other.err()),
    }

    Ok(())
}

#[test]
fn export_requires_a_private_key() -> Result<()> {
    let (adapter, store) = new_adapter()?;

    let r = adapter.generate_self_signed("Alice", "alice@example.com")?;
    let cert = adapter.resolve_certificate(&r)?.unwrap();
    let cert_ref = store.insert(CredentialRecord::certificate_only(vec![cert])?)?;

    match adapter.export_pkcs12(&cert_ref, "hunter2") {
        Err(KeyError::NotAnIdentity(_)) => {}
        other => panic!("expected NotAnIdentity, got {:?}", other.err()),
    }

    Ok(())
}

#[test]
fn export_of_a_stale_ref_reports_not_found() -> Result<()> {
    let (adapter, _) = new_adapter()?;

    let r = adapter.generate_self_signed("Alice", "alice@example.com")?;
    adapter.delete_identity(&r)?;

    match adapter.export_pkcs12(&r, "hunter2") {
        Err(KeyError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other.err()),
    }

    Ok(())
}

#[test]
fn exports_under_different_passwords_both_import() -> Result<()> {
    let (source, _) = new_adapter()?;

    let r = source.generate_self_signed("Alice", "alice@example.com")?;
    let original_digest = source.resolve_certificate(&r)?.unwrap().hex_digest();

    for password in ["hunter2", "correct horse battery staple", ""] {
        let p12 = source.export_pkcs12(&r, password)?;
        let (destination, _) = new_adapter()?;
        let imported = destination.import_pkcs12(&p12, password)?;
        let cert = destination.resolve_certificate(&imported)?.unwrap();
        assert_eq!(cert.hex_digest(), original_digest);
    }

    Ok(())
}
