use std::time::Duration;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

pub const PUBLIC_KEY_URL: &str = "https://run.vast.ai/pubkey/";
const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(15);

/// Parse a PEM-encoded RSA public key, accepting either PKCS#1 (`RSA PUBLIC
/// KEY`) or SubjectPublicKeyInfo/PKCS#8 (`PUBLIC KEY`) framing -- the control
/// plane's exact export format isn't part of the contract, only that it's a
/// PEM RSA key.
pub fn parse_public_key_pem(pem_text: &str) -> Result<RsaPublicKey, String> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem_text) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(pem_text).map_err(|e| format!("malformed RSA public key: {}", e))
}

/// Download the control plane's RSA public key, retrying up to
/// [`MAX_ATTEMPTS`] times at [`RETRY_DELAY`] spacing on parse failure.
///
/// Returns `None` if every attempt fails; callers must then run fail-closed
/// (every subsequent signature check rejects).
pub async fn fetch_public_key(client: &reqwest::Client, url: &str) -> Option<RsaPublicKey> {
    for attempt in 1..=MAX_ATTEMPTS {
        match client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => match parse_public_key_pem(&body) {
                    Ok(key) => return Some(key),
                    Err(e) => debug!("error parsing public key (attempt {}): {}", attempt, e),
                },
                Err(e) => debug!("error reading public key body (attempt {}): {}", attempt, e),
            },
            Err(e) => debug!("error downloading public key (attempt {}): {}", attempt, e),
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    None
}
