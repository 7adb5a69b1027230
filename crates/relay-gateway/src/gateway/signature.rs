use hmac::{Hmac, Mac};
use sha2::Sha256;

use relay_core::constants::SLACK_SIGNATURE_MAX_AGE_SECS;

type HmacSha256 = Hmac<Sha256>;

/// Check a Slack request signature (`v0=<hex hmac-sha256>` over
/// `v0:{timestamp}:{body}`). Requests older than five minutes are refused.
pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_secs: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_secs - ts).abs() > SLACK_SIGNATURE_MAX_AGE_SECS {
        return false;
    }

    let Some(expected) = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produce the `X-Slack-Signature` value for a request.
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(signing_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_531_420_618;

    #[test]
    fn test_known_slack_example() {
        // Worked example from Slack's request verification guide.
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let signature = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";
        assert!(verify_slack_signature(SECRET, "1531420618", body, signature, NOW));
    }

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"type":"url_verification","challenge":"abc"}"#;
        let signature = sign(SECRET, "1531420618", body);
        assert!(verify_slack_signature(SECRET, "1531420618", body, &signature, NOW + 10));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let signature = sign(SECRET, "1531420618", b"original");
        assert!(!verify_slack_signature(SECRET, "1531420618", b"tampered", &signature, NOW));
    }

    #[test]
    fn test_rejects_stale_or_malformed_timestamp() {
        let signature = sign(SECRET, "1531420618", b"body");
        assert!(!verify_slack_signature(SECRET, "1531420618", b"body", &signature, NOW + 301));
        assert!(!verify_slack_signature(SECRET, "yesterday", b"body", &signature, NOW));
    }

    #[test]
    fn test_rejects_malformed_signature() {
        assert!(!verify_slack_signature(SECRET, "1531420618", b"body", "v1=00", NOW));
        assert!(!verify_slack_signature(SECRET, "1531420618", b"body", "v0=zz", NOW));
    }
}
