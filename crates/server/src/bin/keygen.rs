//! Prints fresh signing key material for the `signing_key` setting.
//!
//! The output is `<p>,<q>`: the two prime factors of a new RSA key, base-62
//! encoded. Pass the modulus size in bits as the only argument (default 2048).

use rsa::RsaPrivateKey;
use rsa::traits::PrivateKeyParts;
use sso_provider::oidc::keys::{KeyManager, PUBLIC_EXPONENT, format_base62};

const DEFAULT_BITS: usize = 2048;

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    let bits = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_BITS,
    };

    let key = RsaPrivateKey::new_with_exp(
        &mut rand::rngs::OsRng,
        bits,
        &rsa::BigUint::from(PUBLIC_EXPONENT),
    )?;
    let [p, q] = key.primes() else {
        color_eyre::eyre::bail!("expected a two-prime key");
    };
    let material = format!("{},{}", format_base62(p), format_base62(q));

    // Same path the server takes at startup.
    KeyManager::from_config(&material)?;

    println!("{material}");
    Ok(())
}
