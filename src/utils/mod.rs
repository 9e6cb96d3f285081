pub mod cancel;
pub mod retry;

use url::Url;

/// Renders a database URL with its password masked, for log output.
pub fn redact_db_url(db_url: &str) -> String {
    match Url::parse(db_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}
