use duet_core::{Identity, Recipient, resolve_recipient};

fn id(s: &str) -> Identity {
    s.parse().unwrap()
}

/// Test that the other member is returned regardless of position
#[test]
fn test_resolve_recipient_either_position() {
    let a = id("a@x.com");
    let b = id("b@x.com");
    let members = [a.clone(), b.clone()];

    assert_eq!(
        resolve_recipient(&members, Some(&a)),
        Recipient::Known(b.clone())
    );
    assert_eq!(
        resolve_recipient(&members, Some(&b)),
        Recipient::Known(a.clone())
    );

    let swapped = [b.clone(), a.clone()];
    assert_eq!(
        resolve_recipient(&swapped, Some(&a)),
        Recipient::Known(b.clone())
    );
}

/// Test best-effort fallback to the first member for an outsider
#[test]
fn test_resolve_recipient_outsider_gets_first_member() {
    let a = id("a@x.com");
    let b = id("b@x.com");
    let c = id("c@x.com");

    let recipient = resolve_recipient(&[a.clone(), b], Some(&c));
    assert_eq!(recipient, Recipient::Provisional(a.clone()));
    assert_eq!(recipient.identity(), Some(&a));
    assert!(!recipient.is_known());
}

/// Test fallback to the first member while the local identity is unknown
#[test]
fn test_resolve_recipient_without_self() {
    let a = id("a@x.com");
    let b = id("b@x.com");

    let recipient = resolve_recipient(&[a.clone(), b], None);
    assert_eq!(recipient, Recipient::Provisional(a.clone()));
    assert_eq!(recipient.into_identity(), Some(a));
}

/// Test degenerate memberships
#[test]
fn test_resolve_recipient_unresolved() {
    let a = id("a@x.com");

    assert_eq!(resolve_recipient(&[], Some(&a)), Recipient::Unresolved);
    assert_eq!(resolve_recipient(&[], None), Recipient::Unresolved);
    assert_eq!(
        resolve_recipient(&[a.clone()], Some(&a)),
        Recipient::Unresolved
    );
    assert_eq!(
        resolve_recipient(&[a.clone(), a.clone()], Some(&a)),
        Recipient::Unresolved
    );
    assert_eq!(Recipient::Unresolved.identity(), None);
}
