//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey as RsaSigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::keys::SigningKey;
use crate::error::AppError;

/// Maximum accepted clock skew for the Date header, in seconds
const MAX_DATE_SKEW_SECS: i64 = 300;

/// Headers the signer owns; callers may not pass these as extras
const RESERVED_HEADERS: [&str; 4] = ["host", "date", "digest", "signature"];

/// Headers to send with a signed request
///
/// Entries keep emission order: `Host`, `Date`, `Digest` (if a body is
/// present), `Signature`, then unsigned extras in caller order.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    entries: Vec<(String, String)>,
    signed: Vec<&'static str>,
}

impl SignedHeaders {
    /// Header value by case-insensitive name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Signature header value
    pub fn signature(&self) -> &str {
        self.get("signature").unwrap_or_default()
    }

    /// Date header value (RFC 2616)
    pub fn date(&self) -> &str {
        self.get("date").unwrap_or_default()
    }

    /// Digest header value (if body present)
    pub fn digest(&self) -> Option<&str> {
        self.get("digest")
    }

    /// Names listed in the Signature `headers` parameter, in signing order
    pub fn signed_header_names(&self) -> &[&'static str] {
        &self.signed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into an `http::HeaderMap`
    pub fn to_header_map(&self) -> Result<HeaderMap, AppError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AppError::Validation(format!("Invalid header name {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Validation(format!("Invalid value for {}: {}", key, e)))?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl IntoIterator for SignedHeaders {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Sign an HTTP request
///
/// Creates the headers a peer needs to authenticate an outgoing request.
///
/// # Arguments
/// * `method` - GET or POST
/// * `url` - Full URL being requested
/// * `body` - Exact request body bytes (for digest)
/// * `key` - Private key PEM and key ID (actor#main-key)
/// * `extra_headers` - Unsigned headers to send along (e.g. User-Agent)
///
/// # Errors
/// - `InvalidUrl` if the URL has no host
/// - `InvalidKey` if the private key cannot be parsed
/// - `Validation` for unsupported methods or reserved extra headers
///
/// # Example
/// ```ignore
/// let headers = sign_request(
///     &Method::POST,
///     "https://remote.server/inbox",
///     Some(&body),
///     keypair.signing_key(),
///     &[("User-Agent", "fedsign/0.1.0")],
/// )?;
/// ```
pub fn sign_request(
    method: &Method,
    url: &str,
    body: Option<&[u8]>,
    key: SigningKey<'_>,
    extra_headers: &[(&str, &str)],
) -> Result<SignedHeaders, AppError> {
    sign_request_at(method, url, body, key, extra_headers, Utc::now())
}

/// [`sign_request`] with an explicit signing time.
pub fn sign_request_at(
    method: &Method,
    url: &str,
    body: Option<&[u8]>,
    key: SigningKey<'_>,
    extra_headers: &[(&str, &str)],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, AppError> {
    if *method != Method::GET && *method != Method::POST {
        return Err(AppError::Validation(format!(
            "Unsupported method for signed request: {}",
            method
        )));
    }

    for (name, _) in extra_headers {
        if RESERVED_HEADERS
            .iter()
            .any(|reserved| name.eq_ignore_ascii_case(reserved))
        {
            return Err(AppError::Validation(format!(
                "Header {} is managed by the signer",
                name
            )));
        }
    }

    // 1. Parse URL to get host and path
    let (host, path_and_query) = host_and_target(url)?;

    // 2. Generate Date header
    let date = http_date(now);

    // 3. Generate Digest if body present
    let digest = body.map(generate_digest);

    // 4. Build signing string
    let request_target = format!("{} {}", method.as_str().to_lowercase(), path_and_query);

    let mut components = vec![
        ("(request-target)", request_target.as_str()),
        ("host", host.as_str()),
        ("date", date.as_str()),
    ];
    if let Some(ref digest_value) = digest {
        components.push(("digest", digest_value.as_str()));
    }

    let signing_string = build_signing_string(&components);
    let signed: Vec<&'static str> = components.iter().map(|(name, _)| *name).collect();

    // 5. Sign with RSA-SHA256
    let private_key = parse_private_key(key.private_key_pem)?;
    let signing_key = RsaSigningKey::<Sha256>::new(private_key);
    let signature = signing_key
        .try_sign(signing_string.as_bytes())
        .map_err(|e| AppError::InvalidKey(format!("Signing failed: {}", e)))?;
    let signature_b64 = BASE64.encode(signature.to_bytes());

    // 6. Build Signature header
    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key.key_id,
        signed.join(" "),
        signature_b64
    );

    let mut entries = Vec::with_capacity(4 + extra_headers.len());
    entries.push(("Host".to_string(), host));
    entries.push(("Date".to_string(), date));
    if let Some(digest_value) = digest {
        entries.push(("Digest".to_string(), digest_value));
    }
    entries.push(("Signature".to_string(), signature_header));
    entries.extend(
        extra_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );

    Ok(SignedHeaders { entries, signed })
}

/// Host header value and `path[?query]` of an absolute URL.
///
/// The host carries a port only when it differs from the scheme default,
/// matching what HTTP clients put on the wire.
pub fn host_and_target(url: &str) -> Result<(String, String), AppError> {
    let parsed_url = url::Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))?;

    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(AppError::InvalidUrl(format!(
            "Unsupported scheme: {}",
            parsed_url.scheme()
        )));
    }

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::InvalidUrl(format!("Missing host in URL: {}", url)))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = parsed_url.path();
    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    };

    Ok((host, path_and_query))
}

fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn build_signing_string(components: &[(&str, &str)]) -> String {
    components
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AppError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::InvalidKey(format!("Invalid private key: {}", e)))
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, AppError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::InvalidKey(format!("Invalid public key: {}", e)))
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Verify an HTTP request signature
///
/// # Arguments
/// * `method` - HTTP method
/// * `path` - Request path including query
/// * `headers` - All request headers
/// * `body` - Request body (for digest verification)
/// * `public_key_pem` - RSA public key in PEM format
///
/// # Errors
/// - `Validation` if required headers are missing or malformed
/// - `InvalidSignature` if the date, digest or signature do not check out
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<(), AppError> {
    // 1. Parse Signature header
    let parsed = parse_signature_header(header_str(headers, "signature")?)?;

    // 2. Validate algorithm and required signed headers.
    if parsed.algorithm != "rsa-sha256" && parsed.algorithm != "hs2019" {
        return Err(AppError::Validation(format!(
            "Unsupported signature algorithm: {}",
            parsed.algorithm
        )));
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(AppError::Validation(format!(
                "Signed headers must include: {}",
                required
            )));
        }
    }

    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(AppError::Validation(
            "Signed headers must include: digest".to_string(),
        ));
    }

    // 3. Verify Date is recent.
    let date_str = header_str(headers, "date")?;
    let date = DateTime::parse_from_rfc2822(date_str)
        .map_err(|_| AppError::Validation("Invalid Date format".to_string()))?;

    let diff = (Utc::now().timestamp() - date.timestamp()).abs();
    if diff > MAX_DATE_SKEW_SECS {
        return Err(AppError::InvalidSignature(
            "Date header too old or in future".to_string(),
        ));
    }

    // 4. If body present, verify Digest.
    if let Some(body_data) = body {
        let digest_str = header_str(headers, "digest")?;
        if digest_str != generate_digest(body_data) {
            return Err(AppError::InvalidSignature("Digest mismatch".to_string()));
        }
    }

    // 5. Reconstruct signing string.
    let request_target = format!("{} {}", method.to_lowercase(), path);
    let mut components = Vec::with_capacity(parsed.headers.len());
    for header_name in &parsed.headers {
        let value = if header_name == "(request-target)" {
            request_target.as_str()
        } else {
            header_str(headers, header_name)?
        };
        components.push((header_name.as_str(), value));
    }
    let signing_string = build_signing_string(&components);

    // 6. Verify RSA signature.
    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::Validation("Invalid signature encoding".to_string()))?;
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AppError::Validation(format!("Invalid signature format: {}", e)))?;

    let verifier = VerifyingKey::<Sha256>::new(parse_public_key(public_key_pem)?);
    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::InvalidSignature("Signature verification failed".to_string()))?;

    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .ok_or_else(|| AppError::Validation(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::Validation(format!("Invalid {} header", name)))
}

/// Extract keyId from Signature header.
pub fn extract_signature_key_id(headers: &HeaderMap) -> Result<String, AppError> {
    let parsed = parse_signature_header(header_str(headers, "signature")?)?;
    Ok(parsed.key_id)
}

/// Validate that signature keyId points to the same actor as the activity actor.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm (usually rsa-sha256)
    pub algorithm: String,
    /// Signed header names
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for (key, value) in signature_params(header)? {
        match key {
            "keyId" => key_id = Some(value.to_string()),
            "algorithm" => algorithm = Some(value.to_string()),
            "headers" => {
                headers = Some(
                    value
                        .split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect(),
                )
            }
            "signature" => signature = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| AppError::Validation("Missing keyId".to_string()))?,
        algorithm: algorithm
            .ok_or_else(|| AppError::Validation("Missing algorithm".to_string()))?,
        headers: headers.ok_or_else(|| AppError::Validation("Missing headers".to_string()))?,
        signature: signature
            .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?,
    })
}

/// Split `key="value",key=value` pairs; commas inside quotes belong to the value.
fn signature_params(header: &str) -> Result<Vec<(&str, &str)>, AppError> {
    let mut params = Vec::new();
    let mut rest = header.trim();

    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=').ok_or_else(|| {
            AppError::Validation(format!("Malformed Signature parameter: {}", rest))
        })?;
        let after_key = after_key.trim_start();

        let (value, remainder) = match after_key.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"').ok_or_else(|| {
                    AppError::Validation("Unterminated quoted value in Signature header".to_string())
                })?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after_key.find(',') {
                Some(end) => (after_key[..end].trim_end(), &after_key[end..]),
                None => (after_key.trim_end(), ""),
            },
        };
        params.push((key.trim(), value));

        let remainder = remainder.trim_start();
        rest = match remainder.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if remainder.is_empty() => remainder,
            None => {
                return Err(AppError::Validation(
                    "Expected ',' between Signature parameters".to_string(),
                ));
            }
        };
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::keys::generate_rsa_keypair;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use std::sync::OnceLock;

    const KEY_ID: &str = "https://example.test/users/A#main-key";

    fn test_keys() -> &'static (String, String) {
        static KEYS: OnceLock<(String, String)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let keys = generate_rsa_keypair(1024).expect("key generation should work");
            (keys.private_key_pem, keys.public_key_pem)
        })
    }

    fn key(private_key_pem: &str) -> SigningKey<'_> {
        SigningKey {
            private_key_pem,
            key_id: KEY_ID,
        }
    }

    fn header_map_for(signed: &SignedHeaders) -> HeaderMap {
        signed.to_header_map().expect("header map")
    }

    #[test]
    fn generate_digest_is_deterministic_and_body_sensitive() {
        let a = generate_digest(br#"{"type":"Note","content":"hi"}"#);
        let b = generate_digest(br#"{"type":"Note","content":"hi"}"#);
        let c = generate_digest(br#"{"type":"Note","content":"ho"}"#);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("SHA-256="));
    }

    #[test]
    fn generate_digest_of_empty_body_matches_known_value() {
        assert_eq!(
            generate_digest(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn post_headers_include_digest_and_list_it_last() {
        let (private_key_pem, _) = test_keys();
        let body = br#"{"type":"Follow"}"#;
        let signed = sign_request(
            &Method::POST,
            "https://peer.test/inbox",
            Some(body),
            key(private_key_pem),
            &[],
        )
        .expect("signed");

        assert_eq!(signed.digest(), Some(generate_digest(body).as_str()));
        assert_eq!(
            signed.signed_header_names(),
            ["(request-target)", "host", "date", "digest"]
        );

        let parsed = parse_signature_header(signed.signature()).expect("parsed");
        assert_eq!(parsed.key_id, KEY_ID);
        assert_eq!(parsed.algorithm, "rsa-sha256");
        assert_eq!(parsed.headers, signed.signed_header_names());
    }

    #[test]
    fn get_headers_never_include_digest() {
        let (private_key_pem, _) = test_keys();
        let signed = sign_request(
            &Method::GET,
            "https://peer.test/users/B",
            None,
            key(private_key_pem),
            &[("Accept", "application/activity+json")],
        )
        .expect("signed");

        assert!(signed.digest().is_none());
        assert_eq!(
            signed.signed_header_names(),
            ["(request-target)", "host", "date"]
        );
        assert_eq!(signed.get("accept"), Some("application/activity+json"));
    }

    #[test]
    fn headers_are_emitted_in_signing_order_with_extras_last() {
        let (private_key_pem, _) = test_keys();
        let signed = sign_request(
            &Method::POST,
            "https://peer.test/inbox",
            Some(b"{}"),
            key(private_key_pem),
            &[("User-Agent", "fedsign/test"), ("Content-Type", "application/activity+json")],
        )
        .expect("signed");

        let names: Vec<&str> = signed.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            ["Host", "Date", "Digest", "Signature", "User-Agent", "Content-Type"]
        );
        assert!(!signed.signature().contains("user-agent"));
    }

    #[test]
    fn host_keeps_non_default_port_and_target_keeps_query() {
        let (host, target) = host_and_target("http://127.0.0.1:8080/inbox?page=2").expect("parts");
        assert_eq!(host, "127.0.0.1:8080");
        assert_eq!(target, "/inbox?page=2");

        let (host, target) = host_and_target("https://peer.test:443").expect("parts");
        assert_eq!(host, "peer.test");
        assert_eq!(target, "/");
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let (private_key_pem, public_key_pem) = test_keys();
        let body = br#"{"type":"Follow"}"#;
        let signed = sign_request(
            &Method::POST,
            "https://remote.example/inbox?foo=bar",
            Some(body),
            key(private_key_pem),
            &[("User-Agent", "fedsign/test")],
        )
        .expect("signed");

        let result = verify_signature(
            "POST",
            "/inbox?foo=bar",
            &header_map_for(&signed),
            Some(body),
            public_key_pem,
        );
        assert!(result.is_ok(), "valid signature should verify: {result:?}");
    }

    #[test]
    fn pkcs1_private_keys_are_accepted() {
        let (private_key_pem, public_key_pem) = test_keys();
        let pkcs1_pem = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .expect("pkcs8")
            .to_pkcs1_pem(LineEnding::LF)
            .expect("pkcs1")
            .to_string();

        let signed = sign_request(
            &Method::GET,
            "https://remote.example/users/B",
            None,
            key(&pkcs1_pem),
            &[],
        )
        .expect("signed");

        verify_signature(
            "GET",
            "/users/B",
            &header_map_for(&signed),
            None,
            public_key_pem,
        )
        .expect("pkcs1 signature should verify");
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let (private_key_pem, public_key_pem) = test_keys();
        let signed = sign_request(
            &Method::POST,
            "https://remote.example/inbox",
            Some(br#"{"type":"Follow"}"#),
            key(private_key_pem),
            &[],
        )
        .expect("signed");

        match verify_signature(
            "POST",
            "/inbox",
            &header_map_for(&signed),
            Some(br#"{"type":"Block"}"#),
            public_key_pem,
        ) {
            Err(AppError::InvalidSignature(msg)) => assert!(msg.contains("Digest mismatch")),
            other => panic!("expected digest mismatch, got: {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_wrong_public_key() {
        let (private_key_pem, _) = test_keys();
        let other = generate_rsa_keypair(1024).expect("other key");
        let signed = sign_request(
            &Method::GET,
            "https://remote.example/users/B",
            None,
            key(private_key_pem),
            &[],
        )
        .expect("signed");

        match verify_signature(
            "GET",
            "/users/B",
            &header_map_for(&signed),
            None,
            &other.public_key_pem,
        ) {
            Err(AppError::InvalidSignature(_)) => {}
            other => panic!("expected signature failure, got: {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_stale_date() {
        let (private_key_pem, public_key_pem) = test_keys();
        let signed = sign_request_at(
            &Method::GET,
            "https://remote.example/users/B",
            None,
            key(private_key_pem),
            &[],
            Utc::now() - chrono::Duration::minutes(10),
        )
        .expect("signed");

        match verify_signature(
            "GET",
            "/users/B",
            &header_map_for(&signed),
            None,
            public_key_pem,
        ) {
            Err(AppError::InvalidSignature(msg)) => assert!(msg.contains("Date")),
            other => panic!("expected stale date error, got: {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_when_date_not_in_signed_headers() {
        let (private_key_pem, public_key_pem) = test_keys();
        let body = br#"{"type":"Follow"}"#;
        let signed = sign_request(
            &Method::POST,
            "https://remote.example/inbox",
            Some(body),
            key(private_key_pem),
            &[],
        )
        .expect("signed");
        let mut headers = header_map_for(&signed);

        let parsed = parse_signature_header(signed.signature()).expect("parsed signature");
        let tampered = format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"(request-target) host digest\",signature=\"{}\"",
            parsed.key_id, parsed.algorithm, parsed.signature
        );
        headers.insert(
            "signature",
            HeaderValue::from_str(&tampered).expect("tampered signature"),
        );

        match verify_signature("POST", "/inbox", &headers, Some(body), public_key_pem) {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("Signed headers must include: date"))
            }
            other => panic!("expected missing signed date error, got: {other:?}"),
        }
    }

    #[test]
    fn invalid_private_key_is_reported() {
        match sign_request(
            &Method::GET,
            "https://remote.example/users/B",
            None,
            key("not a pem"),
            &[],
        ) {
            Err(AppError::InvalidKey(_)) => {}
            other => panic!("expected InvalidKey, got: {other:?}"),
        }
    }

    #[test]
    fn url_without_host_is_reported() {
        let (private_key_pem, _) = test_keys();
        for url in ["not a url", "mailto:alice@example.test", "file:///etc/passwd"] {
            match sign_request(&Method::GET, url, None, key(private_key_pem), &[]) {
                Err(AppError::InvalidUrl(_)) => {}
                other => panic!("expected InvalidUrl for {url}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn reserved_extra_headers_are_rejected() {
        let (private_key_pem, _) = test_keys();
        match sign_request(
            &Method::GET,
            "https://remote.example/users/B",
            None,
            key(private_key_pem),
            &[("date", "Thu, 01 Jan 1970 00:00:00 GMT")],
        ) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("date")),
            other => panic!("expected Validation, got: {other:?}"),
        }
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let (private_key_pem, _) = test_keys();
        assert!(matches!(
            sign_request(
                &Method::DELETE,
                "https://remote.example/users/B",
                None,
                key(private_key_pem),
                &[],
            ),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn extract_signature_key_id_reads_key_id() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "signature",
            HeaderValue::from_static(
                "keyId=\"https://remote.example/users/alice#main-key\",algorithm=\"rsa-sha256\",headers=\"(request-target) host date\",signature=\"ZmFrZQ==\"",
            ),
        );

        let key_id = extract_signature_key_id(&headers).expect("keyId should be parsed");
        assert_eq!(key_id, "https://remote.example/users/alice#main-key");
    }

    #[test]
    fn parse_signature_header_requires_all_fields() {
        assert!(parse_signature_header("keyId=\"a\",algorithm=\"rsa-sha256\"").is_err());
    }

    #[test]
    fn parse_signature_header_keeps_commas_inside_quotes() {
        let parsed = parse_signature_header(
            "keyId=\"https://remote.example/users/a,b#main-key\", algorithm=\"rsa-sha256\",headers=\"(request-target) Host date\",signature=\"ZmFr,ZQ==\"",
        )
        .expect("parsed");

        assert_eq!(parsed.key_id, "https://remote.example/users/a,b#main-key");
        assert_eq!(parsed.algorithm, "rsa-sha256");
        assert_eq!(parsed.headers, ["(request-target)", "host", "date"]);
        assert_eq!(parsed.signature, "ZmFr,ZQ==");
    }

    #[test]
    fn parse_signature_header_rejects_unterminated_quote() {
        assert!(matches!(
            parse_signature_header("algorithm=\"rsa-sha256\",keyId=\"https://remote.example/users/a"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn key_id_matches_actor_accepts_same_actor() {
        assert!(key_id_matches_actor(
            "https://remote.example/users/alice#main-key",
            "https://remote.example/users/alice",
        ));
        assert!(!key_id_matches_actor(
            "https://remote.example/users/bob#main-key",
            "https://remote.example/users/alice",
        ));
    }
}
