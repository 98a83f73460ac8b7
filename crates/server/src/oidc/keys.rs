//! Signing key management.
//!
//! The provider signs with a single RSA key. Only the two prime factors are
//! provisioned (base-62 encoded, `"<p>,<q>"`); the modulus and private exponent
//! are derived once at startup and the key is immutable afterwards.

use crate::error::{ProviderError, ProviderResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use num_bigint_dig::{BigInt, BigUint, ModInverse, Sign};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;

/// The only key id this provider ever publishes.
pub const KEY_ID: &str = "sso-signing-key";
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;
pub const PUBLIC_EXPONENT: u32 = 65537;
/// Smallest modulus RS256 signing accepts.
pub const MIN_KEY_BITS: usize = 2048;

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Parse a base-62 integer (`0-9`, then `a-z`, then `A-Z`).
pub fn parse_base62(input: &str) -> Option<BigUint> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut acc = BigUint::from(0u32);
    for c in input.bytes() {
        let digit = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'z' => c - b'a' + 10,
            b'A'..=b'Z' => c - b'A' + 36,
            _ => return None,
        };
        acc = acc * 62u32 + BigUint::from(digit);
    }
    Some(acc)
}

/// Format an integer in base 62, the inverse of [`parse_base62`].
pub fn format_base62(value: &BigUint) -> String {
    let zero = BigUint::from(0u32);
    if *value == zero {
        return "0".to_string();
    }
    let base = BigUint::from(62u32);
    let mut digits = Vec::new();
    let mut rest = value.clone();
    while rest > zero {
        let digit = &rest % &base;
        // digit < 62, so the low byte holds it entirely
        let index = digit.to_bytes_le().first().copied().unwrap_or(0) as usize;
        digits.push(BASE62_ALPHABET[index]);
        rest /= &base;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// A JSON Web Key as published in the JWKS.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: &'static str,
    pub kid: &'static str,
    #[serde(rename = "use")]
    pub key_use: &'static str,
    pub alg: &'static str,
    pub n: String,
    pub e: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Holds the reconstructed signing key for the lifetime of the process.
pub struct KeyManager {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("kid", &KEY_ID)
            .field("bits", &(self.public_key.size() * 8))
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Parse `"<p>,<q>"` configuration material and reconstruct the key.
    pub fn from_config(material: &str) -> ProviderResult<Self> {
        let (p, q) = material.split_once(',').ok_or_else(|| {
            ProviderError::Configuration("signing key must have the form `<p>,<q>`".into())
        })?;
        let p = parse_base62(p)
            .ok_or_else(|| ProviderError::Configuration("invalid p in signing key".into()))?;
        let q = parse_base62(q)
            .ok_or_else(|| ProviderError::Configuration("invalid q in signing key".into()))?;
        Self::reconstruct(p, q, BigUint::from(PUBLIC_EXPONENT))
    }

    /// Derive `n = p·q`, `φ = (p−1)(q−1)` and `d = e⁻¹ mod φ`, then validate
    /// the assembled key and precompute its CRT values.
    #[tracing::instrument(skip_all)]
    pub fn reconstruct(p: BigUint, q: BigUint, e: BigUint) -> ProviderResult<Self> {
        let one = BigUint::from(1u32);
        if p <= one || q <= one {
            return Err(ProviderError::Configuration(
                "signing key primes must be greater than one".into(),
            ));
        }
        if p == q {
            return Err(ProviderError::Configuration(
                "signing key primes must be distinct".into(),
            ));
        }

        let n = &p * &q;
        let phi = (&p - &one) * (&q - &one);
        let d = mod_inverse(&e, &phi).ok_or_else(|| {
            ProviderError::Configuration(
                "public exponent is not invertible modulo the totient".into(),
            )
        })?;

        if n.bits() < MIN_KEY_BITS {
            return Err(ProviderError::Configuration(format!(
                "signing key is {} bits, at least {MIN_KEY_BITS} are required",
                n.bits()
            )));
        }

        let mut private_key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| ProviderError::Configuration(format!("invalid signing key: {e}")))?;
        private_key
            .validate()
            .map_err(|e| ProviderError::Configuration(format!("invalid signing key: {e}")))?;
        private_key
            .precompute()
            .map_err(|e| ProviderError::Configuration(format!("invalid signing key: {e}")))?;

        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| ProviderError::Configuration(format!("cannot encode signing key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let public_key = private_key.to_public_key();
        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            &URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        )
        .map_err(|e| ProviderError::Configuration(format!("cannot build verification key: {e}")))?;

        tracing::info!(
            kid = KEY_ID,
            bits = public_key.size() * 8,
            "Signing key reconstructed"
        );

        Ok(Self {
            private_key,
            public_key,
            encoding_key,
            decoding_key,
        })
    }

    /// Sign a SHA-256 digest with PKCS#1 v1.5 padding.
    pub fn sign(&self, digest: &[u8]) -> ProviderResult<Vec<u8>> {
        self.private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
            .map_err(|e| ProviderError::Internal(format!("signing failed: {e}")))
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA",
            kid: KEY_ID,
            key_use: "sig",
            alg: "RS256",
            n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        }
    }

    /// No rotation: exactly one key is ever advertised.
    pub fn key_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk()],
        }
    }
}

fn mod_inverse(e: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let inverse: BigInt = e.clone().mod_inverse(modulus)?;
    let m = BigInt::from_biguint(Sign::Plus, modulus.clone());
    (((inverse % &m) + &m) % &m).to_biguint()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PrivateKeyParts;
    use sha2::Digest;

    fn primes_of(bits: usize) -> (BigUint, BigUint) {
        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits).expect("generate key");
        let primes = key.primes();
        (primes[0].clone(), primes[1].clone())
    }

    fn test_primes() -> (BigUint, BigUint) {
        static PRIMES: std::sync::OnceLock<(BigUint, BigUint)> = std::sync::OnceLock::new();
        PRIMES.get_or_init(|| primes_of(MIN_KEY_BITS)).clone()
    }

    #[test]
    fn base62_round_trip() {
        for value in [0u64, 1, 61, 62, 3843, 3844, u64::MAX] {
            let big = BigUint::from(value);
            assert_eq!(parse_base62(&format_base62(&big)), Some(big));
        }
        assert_eq!(parse_base62("Z"), Some(BigUint::from(61u32)));
        assert_eq!(parse_base62("10"), Some(BigUint::from(62u32)));
    }

    #[test]
    fn base62_rejects_garbage() {
        assert_eq!(parse_base62(""), None);
        assert_eq!(parse_base62("12-3"), None);
        assert_eq!(parse_base62("abc def"), None);
    }

    #[test]
    fn reconstructed_exponent_inverts_e() {
        let (p, q) = test_primes();
        let manager = KeyManager::reconstruct(p.clone(), q.clone(), BigUint::from(PUBLIC_EXPONENT))
            .expect("reconstruct");
        let one = BigUint::from(1u32);
        let phi = (&p - &one) * (&q - &one);
        let d = manager.private_key().d().clone();
        assert_eq!((BigUint::from(PUBLIC_EXPONENT) * d) % phi, one);
        assert_eq!(manager.public_key().n().clone(), &p * &q);
    }

    #[test]
    fn signature_verifies_with_public_key() {
        let (p, q) = test_primes();
        let material = format!("{},{}", format_base62(&p), format_base62(&q));
        let manager = KeyManager::from_config(&material).expect("reconstruct from config");

        let digest = Sha256::digest(b"hello relying party");
        let signature = manager.sign(&digest).expect("sign");
        manager
            .public_key()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .expect("signature verifies");

        let other = Sha256::digest(b"tampered");
        assert!(
            manager
                .public_key()
                .verify(Pkcs1v15Sign::new::<Sha256>(), &other, &signature)
                .is_err()
        );
    }

    #[test]
    fn jwks_advertises_exactly_one_key() {
        let (p, q) = test_primes();
        let manager = KeyManager::reconstruct(p, q, BigUint::from(PUBLIC_EXPONENT)).unwrap();
        let set = manager.key_set();
        assert_eq!(set.keys.len(), 1);
        let jwk = &set.keys[0];
        assert_eq!(jwk.kid, KEY_ID);
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn malformed_material_is_a_configuration_error() {
        assert!(matches!(
            KeyManager::from_config("no-comma-here"),
            Err(ProviderError::Configuration(_))
        ));
        assert!(matches!(
            KeyManager::from_config("abc,!!"),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[test]
    fn exponent_without_inverse_is_rejected() {
        // p - 1 = 2·65537, so e divides the totient and has no inverse.
        let result = KeyManager::reconstruct(
            BigUint::from(2u32 * PUBLIC_EXPONENT + 1),
            BigUint::from(3u32),
            BigUint::from(PUBLIC_EXPONENT),
        );
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn short_modulus_is_rejected() {
        let (p, q) = primes_of(1024);
        let result = KeyManager::reconstruct(p, q, BigUint::from(PUBLIC_EXPONENT));
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn reconstructed_key_signs_tokens() {
        let (p, q) = test_primes();
        let manager = KeyManager::reconstruct(p, q, BigUint::from(PUBLIC_EXPONENT)).unwrap();
        let mut header = jsonwebtoken::Header::new(SIGNING_ALGORITHM);
        header.kid = Some(KEY_ID.to_string());
        let claims = serde_json::json!({ "sub": "u1", "exp": 4_102_444_800u64 });
        let token =
            jsonwebtoken::encode(&header, &claims, manager.encoding_key()).expect("encode token");

        let mut validation = jsonwebtoken::Validation::new(SIGNING_ALGORITHM);
        validation.validate_aud = false;
        let decoded =
            jsonwebtoken::decode::<serde_json::Value>(&token, manager.decoding_key(), &validation)
                .expect("decode token");
        assert_eq!(decoded.claims["sub"], "u1");
    }

    #[test]
    fn equal_primes_are_rejected() {
        let (p, _) = test_primes();
        let result = KeyManager::reconstruct(p.clone(), p, BigUint::from(PUBLIC_EXPONENT));
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }
}
