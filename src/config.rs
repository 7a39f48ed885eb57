use serde::{Deserialize, Serialize};

const API_KEY_VAR: &str = "FIREBASE_API_KEY";
const AUTH_DOMAIN_VAR: &str = "FIREBASE_AUTH_DOMAIN";
const PROJECT_ID_VAR: &str = "FIREBASE_PROJECT_ID";
const STORAGE_BUCKET_VAR: &str = "FIREBASE_STORAGE_BUCKET";
const MESSAGING_SENDER_ID_VAR: &str = "FIREBASE_MESSAGING_SENDER_ID";
const APP_ID_VAR: &str = "FIREBASE_APP_ID";
const VAPID_KEY_VAR: &str = "FIREBASE_VAPID_KEY";

/// Backend credentials plus the VAPID key used for token issuance.
///
/// Serialised with the same camelCase keys the messaging SDK expects, since
/// this is also the payload handed to the background worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapid_key: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatus {
    pub label: &'static str,
    pub is_set: bool,
}

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

impl Configuration {
    pub fn from_env() -> Self {
        let vapid_key = std::env::var(VAPID_KEY_VAR)
            .ok()
            .filter(|key| !key.is_empty());

        Configuration {
            api_key: env_or_empty(API_KEY_VAR),
            auth_domain: env_or_empty(AUTH_DOMAIN_VAR),
            project_id: env_or_empty(PROJECT_ID_VAR),
            storage_bucket: env_or_empty(STORAGE_BUCKET_VAR),
            messaging_sender_id: env_or_empty(MESSAGING_SENDER_ID_VAR),
            app_id: env_or_empty(APP_ID_VAR),
            vapid_key,
        }
    }

    /// Returns the serialised names of the credentials that are empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        [
            ("apiKey", &self.api_key),
            ("authDomain", &self.auth_domain),
            ("projectId", &self.project_id),
            ("storageBucket", &self.storage_bucket),
            ("messagingSenderId", &self.messaging_sender_id),
            ("appId", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn validate(&self) -> Result<(), Vec<&'static str>> {
        let missing = self.missing_credentials();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    pub fn status(&self) -> Vec<ConfigStatus> {
        vec![
            ConfigStatus {
                label: "API Key",
                is_set: !self.api_key.is_empty(),
            },
            ConfigStatus {
                label: "Project ID",
                is_set: !self.project_id.is_empty(),
            },
            ConfigStatus {
                label: "Messaging Sender ID",
                is_set: !self.messaging_sender_id.is_empty(),
            },
            ConfigStatus {
                label: "VAPID Key",
                is_set: self.vapid_key.is_some(),
            },
        ]
    }
}

#[cfg(test)]
pub(crate) fn test_configuration() -> Configuration {
    Configuration {
        api_key: "api-key".to_string(),
        auth_domain: "demo.firebaseapp.com".to_string(),
        project_id: "demo-project".to_string(),
        storage_bucket: "demo.appspot.com".to_string(),
        messaging_sender_id: "1234567890".to_string(),
        app_id: "1:1234567890:web:abcdef".to_string(),
        vapid_key: Some(crate::loopback::tests::VALID_VAPID_KEY.to_string()),
    }
}
