use std::env;

use super::ServerConfig;
use super::validation::{validate_base_url, validate_twilio_credentials};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible
    /// defaults. Also loads from a `.env` file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Numeric variables are malformed
    /// - Base URLs carry a trailing slash or no scheme
    /// - Twilio credentials are only partially provided
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        // Server configuration
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;
        let app_base_url =
            env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string());

        // Generation backend
        let backend_base_url =
            env::var("AGENT_BACKEND_URL").unwrap_or_else(|_| "http://localhost:3002".to_string());
        let generation_timeout_seconds = parse_u64("GENERATION_TIMEOUT_SECONDS", 90)?;

        // Telephony provider
        let twilio_account_sid = env::var("TWILIO_ACCOUNT_SID").ok();
        let twilio_auth_token = env::var("TWILIO_AUTH_TOKEN").ok();
        let twilio_api_base =
            env::var("TWILIO_API_BASE").unwrap_or_else(|_| "https://api.twilio.com".to_string());

        // Speech providers
        let elevenlabs_api_key = env::var("ELEVENLABS_API_KEY").ok();
        let elevenlabs_voice_id =
            env::var("ELEVENLABS_VOICE_ID").unwrap_or_else(|_| "21m00Tcm4TlvDq8ikWAM".to_string());

        // Call behavior
        let max_turns = env::var("MAX_TURNS")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u32>()
            .map_err(|e| format!("Invalid MAX_TURNS: {e}"))?;
        let hold_music_url = env::var("HOLD_MUSIC_URL").unwrap_or_else(|_| {
            "http://com.twilio.music.classical.s3.amazonaws.com/BusyStrings.mp3".to_string()
        });

        // TTLs
        let audio_cache_ttl_seconds = parse_u64("AUDIO_CACHE_TTL_SECONDS", 5 * 60)?;
        let idempotency_ttl_seconds = parse_u64("IDEMPOTENCY_TTL_SECONDS", 2 * 60)?;
        let session_ttl_seconds = parse_u64("SESSION_TTL_SECONDS", 2 * 60 * 60)?;

        validate_base_url("APP_BASE_URL", &app_base_url)?;
        validate_base_url("AGENT_BACKEND_URL", &backend_base_url)?;
        validate_base_url("TWILIO_API_BASE", &twilio_api_base)?;
        validate_twilio_credentials(&twilio_account_sid, &twilio_auth_token)?;

        Ok(ServerConfig {
            host,
            port,
            app_base_url,
            backend_base_url,
            generation_timeout_seconds,
            twilio_account_sid,
            twilio_auth_token,
            twilio_api_base,
            elevenlabs_api_key,
            elevenlabs_voice_id,
            max_turns,
            hold_music_url,
            audio_cache_ttl_seconds,
            idempotency_ttl_seconds,
            session_ttl_seconds,
        })
    }
}

fn parse_u64(name: &str, default: u64) -> Result<u64, String> {
    match env::var(name) {
        Ok(v) => v.parse::<u64>().map_err(|e| format!("Invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("APP_BASE_URL");
            env::remove_var("AGENT_BACKEND_URL");
            env::remove_var("TWILIO_ACCOUNT_SID");
            env::remove_var("TWILIO_AUTH_TOKEN");
            env::remove_var("MAX_TURNS");
            env::remove_var("AUDIO_CACHE_TTL_SECONDS");
            env::remove_var("IDEMPOTENCY_TTL_SECONDS");
            env::remove_var("GENERATION_TIMEOUT_SECONDS");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.port, 3001);
        assert_eq!(config.max_turns, 20);
        assert_eq!(config.generation_timeout_seconds, 90);
        assert_eq!(config.audio_cache_ttl_seconds, 300);
        assert_eq!(config.idempotency_ttl_seconds, 120);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_trailing_slash_base_url() {
        cleanup_env_vars();
        unsafe {
            env::set_var("APP_BASE_URL", "https://example.com/");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_partial_twilio_credentials() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TWILIO_ACCOUNT_SID", "ACxxxxxxxx");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_callback_urls_embed_call_identity() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().expect("Should load config");
        let url = config.respond_url("agent-1", "call-9");
        assert_eq!(
            url,
            "http://localhost:3001/twilio/voice/agent-1/respond?call_id=call-9"
        );
        let cb = config.callback_url("agent-1", "call-9", "audio-5");
        assert!(cb.contains("audio_id=audio-5"));
        assert!(cb.contains("call_id=call-9"));

        cleanup_env_vars();
    }
}
