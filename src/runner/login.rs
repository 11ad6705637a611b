//! Login wall detection
//!
//! Both signals are required: the location must look like an authentication
//! page and the oracle's reasoning must talk about signing in.

use url::Url;

use crate::domain::{AgentOutput, EnvironmentSnapshot};

const LOCATION_KEYWORDS: [&str; 4] = ["login", "signin", "auth", "account"];
const INTENT_KEYWORDS: [&str; 4] = ["login", "sign in", "credentials", "password"];

/// Display name used when no service can be derived
pub const DEFAULT_SERVICE_NAME: &str = "this service";

pub struct LoginDetector;

impl LoginDetector {
    /// True when the run is blocked on a human login
    pub fn needs_login(snapshot: &EnvironmentSnapshot, output: &AgentOutput) -> bool {
        let location = snapshot.url.to_lowercase();
        if !LOCATION_KEYWORDS.iter().any(|k| location.contains(k)) {
            return false;
        }
        let thought = output.thought().to_lowercase();
        INTENT_KEYWORDS.iter().any(|k| thought.contains(k))
    }

    /// "https://www.github.com/login" -> "Github"
    pub fn service_name(location: Option<&str>) -> String {
        location
            .and_then(|loc| Url::parse(loc).ok())
            .and_then(|url| url.host_str().map(str::to_string))
            .and_then(|host| {
                let host = host.strip_prefix("www.").unwrap_or(&host);
                host.split('.').next().filter(|label| !label.is_empty()).map(capitalize)
            })
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string())
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
