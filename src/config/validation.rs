//! Startup validation for server configuration.

/// Base URLs are embedded verbatim into callback URLs handed to the
/// telephony provider, so they must carry a scheme and no trailing slash.
pub(super) fn validate_base_url(name: &str, value: &str) -> Result<(), String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!("{name} must start with http:// or https://"));
    }
    if value.ends_with('/') {
        return Err(format!("{name} must not end with a trailing slash"));
    }
    Ok(())
}

/// Twilio credentials are optional (the server can run with a stubbed call
/// control client in tests), but providing only one half is always a
/// deployment mistake.
pub(super) fn validate_twilio_credentials(
    account_sid: &Option<String>,
    auth_token: &Option<String>,
) -> Result<(), String> {
    match (account_sid, auth_token) {
        (Some(sid), Some(_)) => {
            if !sid.starts_with("AC") {
                return Err("TWILIO_ACCOUNT_SID must start with 'AC'".to_string());
            }
            Ok(())
        }
        (None, None) => Ok(()),
        _ => Err(
            "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN must be provided together".to_string(),
        ),
    }
}
