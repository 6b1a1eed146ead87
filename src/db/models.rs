use crate::config::{
    KEY_ADMIN_PASSWORD, KEY_API_ENDPOINT, KEY_API_KEY, KEY_COMPANY_NAME, KEY_CONTACT_LINKEDIN,
    KEY_CONTACT_MEETING, KEY_CONTACT_NAME, KEY_CONTACT_PHOTO, KEY_CONTACT_TITLE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Which part of the site a config key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Endpoint of the chat API. Public.
    Api,
    /// Never served to anonymous callers.
    Secret,
    /// Footer contact card and company name.
    Contact,
    Other,
}

impl ConfigKey {
    pub fn classify(key: &str) -> Self {
        match key {
            KEY_API_ENDPOINT => Self::Api,
            KEY_API_KEY | KEY_ADMIN_PASSWORD => Self::Secret,
            KEY_CONTACT_NAME | KEY_CONTACT_TITLE | KEY_CONTACT_PHOTO | KEY_CONTACT_MEETING
            | KEY_CONTACT_LINKEDIN | KEY_COMPANY_NAME => Self::Contact,
            _ => Self::Other,
        }
    }

    pub fn is_secret(key: &str) -> bool {
        Self::classify(key) == Self::Secret
    }

    /// Keys whose change requires the chat client to be rebuilt.
    pub fn affects_api(key: &str) -> bool {
        key == KEY_API_ENDPOINT || key == KEY_API_KEY
    }
}

/// Drop secret keys from a config map.
pub fn public_view(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(k, _)| !ConfigKey::is_secret(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub endpoint: String,
    pub api_key: String,
}

impl ApiSettings {
    /// Both values present and the endpoint an http(s) URL.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
            && Url::parse(self.endpoint.trim())
                .is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSettings {
    pub name: String,
    pub title: String,
    pub photo_url: String,
    pub meeting_url: String,
    pub linkedin_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub api: ApiSettings,
    pub contact: ContactSettings,
    pub company_name: String,
}

impl SiteSettings {
    /// Build the typed view; missing keys become empty strings.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let get = |k: &str| map.get(k).cloned().unwrap_or_default();
        Self {
            api: ApiSettings {
                endpoint: get(KEY_API_ENDPOINT),
                api_key: get(KEY_API_KEY),
            },
            contact: ContactSettings {
                name: get(KEY_CONTACT_NAME),
                title: get(KEY_CONTACT_TITLE),
                photo_url: get(KEY_CONTACT_PHOTO),
                meeting_url: get(KEY_CONTACT_MEETING),
                linkedin_url: get(KEY_CONTACT_LINKEDIN),
            },
            company_name: get(KEY_COMPANY_NAME),
        }
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (KEY_API_ENDPOINT.to_string(), self.api.endpoint),
            (KEY_API_KEY.to_string(), self.api.api_key),
            (KEY_CONTACT_NAME.to_string(), self.contact.name),
            (KEY_CONTACT_TITLE.to_string(), self.contact.title),
            (KEY_CONTACT_PHOTO.to_string(), self.contact.photo_url),
            (KEY_CONTACT_MEETING.to_string(), self.contact.meeting_url),
            (KEY_CONTACT_LINKEDIN.to_string(), self.contact.linkedin_url),
            (KEY_COMPANY_NAME.to_string(), self.company_name),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_keys() {
        assert_eq!(ConfigKey::classify("API_ENDPOINT"), ConfigKey::Api);
        assert_eq!(ConfigKey::classify("API_KEY"), ConfigKey::Secret);
        assert_eq!(ConfigKey::classify("ADMIN_PASSWORD"), ConfigKey::Secret);
        assert_eq!(ConfigKey::classify("COMPANY_NAME"), ConfigKey::Contact);
        assert_eq!(ConfigKey::classify("BANNER_TEXT"), ConfigKey::Other);
        assert!(ConfigKey::affects_api("API_KEY"));
        assert!(!ConfigKey::affects_api("ADMIN_PASSWORD"));
    }

    #[test]
    fn public_view_hides_secrets() {
        let map = BTreeMap::from([
            ("API_KEY".to_string(), "sk-1".to_string()),
            ("ADMIN_PASSWORD".to_string(), "hunter2".to_string()),
            ("COMPANY_NAME".to_string(), "Acme".to_string()),
        ]);
        let public = public_view(&map);
        assert_eq!(public.len(), 1);
        assert_eq!(public.get("COMPANY_NAME").map(String::as_str), Some("Acme"));
    }

    #[test]
    fn settings_from_partial_map() {
        let map = BTreeMap::from([
            ("API_ENDPOINT".to_string(), "https://llm.example/v1".to_string()),
            ("CONTACT_NAME".to_string(), "Ada".to_string()),
        ]);
        let settings = SiteSettings::from_map(&map);
        assert_eq!(settings.api.endpoint, "https://llm.example/v1");
        assert!(!settings.api.is_configured());
        assert_eq!(settings.contact.name, "Ada");
        assert_eq!(settings.company_name, "");

        let mut api = settings.api.clone();
        api.api_key = "sk-1".to_string();
        assert!(api.is_configured());
        api.endpoint = "not a url".to_string();
        assert!(!api.is_configured());
        api.endpoint = "ftp://llm.example/v1".to_string();
        assert!(!api.is_configured());

        let back = SiteSettings::from_map(&settings.clone().into_map());
        assert_eq!(back, settings);
    }
}
