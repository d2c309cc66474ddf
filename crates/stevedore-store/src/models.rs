//! Domain records persisted by the orchestrator.
//!
//! Bucket naming:
//! - `apps/<app_name>`: the [`App`] record, `app_name` being `<app_id>_<env>`
//! - `<app_name>/<service>`: one [`Service`] record per provisioned service
//! - `<app_id>_meta/env`: the application's [`Evars`] table
//! - `<app_id>_releases/<timestamp>`: [`Release`] records written by deploys
//! - `dhcp/leases`: the address pool's lease table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const APPS_BUCKET: &str = "apps";
pub const DHCP_BUCKET: &str = "dhcp";
pub const EVARS_KEY: &str = "env";

/// Env tags whose `app_name` would land on a per-application bucket.
pub const RESERVED_ENV_TAGS: &[&str] = &["meta", "releases"];

pub fn app_name(app_id: &str, env: &str) -> String {
    format!("{app_id}_{env}")
}

pub fn meta_bucket(app_id: &str) -> String {
    app_name(app_id, RESERVED_ENV_TAGS[0])
}

pub fn releases_bucket(app_id: &str) -> String {
    app_name(app_id, RESERVED_ENV_TAGS[1])
}

/// Whether `bucket` belongs to the application itself rather than to one of
/// its environments.
pub fn is_reserved_bucket(app_id: &str, bucket: &str) -> bool {
    RESERVED_ENV_TAGS
        .iter()
        .any(|tag| bucket == app_name(app_id, tag))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub app_id: String,
    pub env: String,
    /// Services whose external address belongs to the application.
    #[serde(default)]
    pub global_ips: BTreeMap<String, String>,
    /// Services whose internal address is an application-level cache.
    #[serde(default)]
    pub local_ips: BTreeMap<String, String>,
    /// Deploy alias to target application.
    #[serde(default)]
    pub remotes: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: String,
}

impl App {
    pub fn global_ip(&self, service: &str) -> Option<&str> {
        self.global_ips
            .get(service)
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }

    pub fn local_ip(&self, service: &str) -> Option<&str> {
        self.local_ips
            .get(service)
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }
}

/// A missing service loads as the zero value: every field empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub external_ip: String,
    #[serde(default)]
    pub internal_ip: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Evars(BTreeMap<String, String>);

impl Evars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns whether the key was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    /// Drop every variable whose name starts with `prefix` and return the
    /// removed names. Raw string prefix: `DATA_DB` also matches `DATA_DBX_FOO`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> Vec<String> {
        let doomed: Vec<String> = self
            .0
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.0.remove(key);
        }
        doomed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Evars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub alias: String,
    pub target: String,
    pub app_name: String,
    /// Service name to image at deploy time.
    pub services: BTreeMap<String, String>,
    pub evars: Evars,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> Evars {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn bucket_names() {
        assert_eq!(app_name("shop", "sim"), "shop_sim");
        assert_eq!(meta_bucket("shop"), "shop_meta");
        assert_eq!(releases_bucket("shop"), "shop_releases");
    }

    #[test]
    fn reserved_buckets_are_not_environments() {
        assert!(is_reserved_bucket("shop", &app_name("shop", "meta")));
        assert!(is_reserved_bucket("shop", "shop_releases"));
        assert!(!is_reserved_bucket("shop", "shop_sim"));
        assert!(!is_reserved_bucket("shop", "other_meta"));
    }

    #[test]
    fn remove_prefixed_filters_service_vars() {
        let mut evars = table(&[
            ("DATA_DB_HOST", "x"),
            ("DATA_DB_PORT", "5"),
            ("OTHER_KEY", "y"),
        ]);
        let removed = evars.remove_prefixed("DATA_DB");
        assert_eq!(removed, vec!["DATA_DB_HOST", "DATA_DB_PORT"]);
        assert_eq!(evars, table(&[("OTHER_KEY", "y")]));
    }

    #[test]
    fn remove_prefixed_over_matches_longer_names() {
        let mut evars = table(&[("DATA_DBX_FOO", "1"), ("DATA_D", "2")]);
        evars.remove_prefixed("DATA_DB");
        assert_eq!(evars, table(&[("DATA_D", "2")]));
    }

    #[test]
    fn remove_prefixed_on_empty_table_is_noop() {
        let mut evars = Evars::new();
        assert!(evars.remove_prefixed("WEB").is_empty());
        assert!(evars.is_empty());
    }

    #[test]
    fn evars_serialize_as_plain_map() {
        let evars = table(&[("A", "1")]);
        assert_eq!(serde_json::to_string(&evars).unwrap(), r#"{"A":"1"}"#);
    }

    #[test]
    fn app_ip_lookups_ignore_empty_entries() {
        let mut app = App::default();
        app.global_ips.insert("web".to_owned(), String::new());
        app.local_ips
            .insert("cache".to_owned(), "10.0.0.9".to_owned());
        assert_eq!(app.global_ip("web"), None);
        assert_eq!(app.local_ip("cache"), Some("10.0.0.9"));
        assert_eq!(app.local_ip("web"), None);
    }

    #[test]
    fn app_backward_compat_without_remotes() {
        let json = r#"{"app_id": "shop", "env": "sim", "global_ips": {}, "local_ips": {}}"#;
        let app: App = serde_json::from_str(json).unwrap();
        assert!(app.remotes.is_empty());
        assert!(app.created_at.is_empty());
    }
}
