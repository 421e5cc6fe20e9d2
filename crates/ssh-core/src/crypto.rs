use russh::{Preferred, kex};
use std::borrow::Cow;

/// Key exchange algorithms offered to bastion hosts, in order of preference.
///
/// Diffie-Hellman group exchange and group14 come first so that older
/// appliances still negotiate; curve25519 and the NIST curves follow.
pub const TUNNEL_KEX: &[kex::Name] = &[
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
    kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
];

pub fn default_preferred() -> Preferred {
    Preferred::DEFAULT.clone()
}

/// russh defaults with the tunnel key-exchange list.
pub fn tunnel_preferred() -> Preferred {
    Preferred {
        kex: Cow::Borrowed(TUNNEL_KEX),
        ..default_preferred()
    }
}
